// Compiler and outer interpreter
//
// The token loop, dictionary search, the defining words, and the words that
// build compiled bodies. A colon body is a run of execution tokens: each
// compiled word is followed by a chaining token, a literal is a cell-runtime
// token followed by the value, and the body ends with an unnest token.

use crate::error::{Result, VmError};
use crate::kernel::{
    pack_xt, xt_pfa, xt_rid, CELL, CURRENT_DEF_ADDR, FALSE, FLAGS_OFFSET, FLAG_HIDDEN,
    FLAG_IMMEDIATE, HEADER_SIZE, LINK_OFFSET, MEMORY_SIZE, NAME_MAX, NATIVE_XT_ADDR, STATE_ADDR,
    TRUE, XT_OFFSET,
};
use crate::internals::parser;
use crate::runtime::{
    ForthRuntime, RID_CELL, RID_CONSTANT, RID_NEST, RID_NEXT, RID_UNNEST, RID_VALUE, RID_VARIABLE,
};

impl ForthRuntime {
    /// One token of the outer loop: parse, look up, then execute, compile,
    /// or convert to a number. Returns false once the line is exhausted.
    ///
    pub(crate) fn interpret_token(&mut self) -> Result<bool> {
        let (addr, len) = self.parse_name()?;
        if len == 0 {
            return Ok(false);
        }
        let query = self.fold_for_lookup(addr, len)?;
        let (xt, status) = self.find(query)?;
        if status != 0 {
            if status > 0 || !self.compiling()? {
                self.execute_xt(xt)?;
            } else {
                self.compile_xt(xt)?;
            }
            return Ok(true);
        }
        let token = self.token_text(addr, len)?;
        match parser::number(&token) {
            Some(n) => {
                if self.compiling()? {
                    self.compile_literal(n)?;
                } else {
                    self.kernel.push(n)?;
                }
            }
            None => return Err(VmError::UnknownWord),
        }
        Ok(true)
    }

    pub(crate) fn compiling(&self) -> Result<bool> {
        Ok(self.kernel.fetch(STATE_ADDR)? != FALSE)
    }

    /// find walks the definition chain from the latest header, skipping
    /// hidden entries. The query is a counted, uppercase-folded string.
    /// Returns (xt, 1) for an immediate hit, (xt, -1) for a regular hit, and
    /// (query address, 0) on a miss.
    ///
    pub fn find(&mut self, query: usize) -> Result<(f64, i32)> {
        match self.find_header(query)? {
            Some((nfa, flags)) => {
                let xt = self.kernel.fetch(nfa + XT_OFFSET)?;
                let status = if flags & FLAG_IMMEDIATE != 0 { 1 } else { -1 };
                Ok((xt, status))
            }
            None => Ok((query as f64, 0)),
        }
    }

    fn find_header(&self, query: usize) -> Result<Option<(usize, u8)>> {
        let mut nfa = self.kernel.fetch(CURRENT_DEF_ADDR)? as usize;
        while nfa != 0 {
            let flags = self.kernel.c_fetch(nfa + FLAGS_OFFSET)?;
            if flags & FLAG_HIDDEN == 0 && self.kernel.string_equal(nfa, query)? {
                return Ok(Some((nfa, flags)));
            }
            nfa = self.kernel.fetch(nfa + LINK_OFFSET)? as usize;
        }
        Ok(None)
    }

    /// compile_xt appends a word reference to the open definition, followed
    /// by the chaining token that carries execution to the cell after it.
    ///
    pub(crate) fn compile_xt(&mut self, xt: f64) -> Result<()> {
        self.kernel.align_here();
        self.kernel.comma(xt)?;
        let chain = self.kernel.here();
        self.kernel.comma(pack_xt(chain, RID_NEXT))
    }

    /// compile_literal appends a cell-runtime token pointing one cell past
    /// itself, then the value.
    ///
    pub(crate) fn compile_literal(&mut self, val: f64) -> Result<()> {
        self.kernel.align_here();
        let lit = self.kernel.here() + CELL;
        self.kernel.comma(pack_xt(lit, RID_CELL))?;
        self.kernel.comma(val)
    }

    /// create <name> ( -- ) makes a new dictionary entry with an empty
    /// parameter field
    ///     The name is folded to uppercase directly into the header; the
    ///     entry starts out with the variable runtime, so the bare name
    ///     pushes its parameter field address.
    ///
    pub fn f_create(&mut self, _pfa: usize) -> Result<()> {
        let (addr, len) = self.parse_name()?;
        if len == 0 {
            return Err(VmError::EmptyName);
        }
        if len > NAME_MAX {
            log::warn!(
                "create: name {:?} truncated to {} chars",
                self.token_text(addr, len)?,
                NAME_MAX
            );
        }
        self.kernel.align_here();
        let header = self.kernel.here();
        if header + HEADER_SIZE >= MEMORY_SIZE {
            return Err(VmError::OutOfMemory);
        }
        self.kernel.uppercase_copy(addr, len.min(NAME_MAX), header)?;
        self.kernel.c_store(header + FLAGS_OFFSET, 0)?;
        let prev = self.kernel.fetch(CURRENT_DEF_ADDR)?;
        self.kernel.store(header + LINK_OFFSET, prev)?;
        let xt = pack_xt(header + HEADER_SIZE, RID_VARIABLE);
        self.kernel.store(header + XT_OFFSET, xt)?;
        self.kernel.store(CURRENT_DEF_ADDR, header as f64)?;
        self.kernel.set_here(header + HEADER_SIZE);
        Ok(())
    }

    /// variable <name> ( -- ) creates a word with one zeroed cell
    pub fn f_variable(&mut self, _pfa: usize) -> Result<()> {
        self.f_create(0)?;
        self.kernel.comma(0.0)
    }

    /// constant <name> ( n -- ) creates a word that pushes n
    pub fn f_constant(&mut self, _pfa: usize) -> Result<()> {
        let val = self.kernel.pop()?;
        self.f_create(0)?;
        self.set_latest_rid(RID_CONSTANT)?;
        self.kernel.comma(val)
    }

    /// value <name> ( n -- ) like constant, but TO can rewrite the cell
    pub fn f_value(&mut self, _pfa: usize) -> Result<()> {
        let val = self.kernel.pop()?;
        self.f_create(0)?;
        self.set_latest_rid(RID_VALUE)?;
        self.kernel.comma(val)
    }

    /// to <name> ( n -- ) stores n in the named word's parameter field
    pub fn f_to(&mut self, _pfa: usize) -> Result<()> {
        let xt = self.tick()?;
        let val = self.kernel.pop()?;
        self.kernel.store(xt_pfa(xt), val)
    }

    /// : <name> ( -- ) opens a definition: header, hidden while building,
    /// nest runtime, compile state
    ///
    pub fn f_colon(&mut self, _pfa: usize) -> Result<()> {
        self.f_create(0)?;
        self.set_latest_flag(FLAG_HIDDEN, true)?;
        self.set_latest_rid(RID_NEST)?;
        self.kernel.store(STATE_ADDR, TRUE)
    }

    /// ; ( -- ) closes the definition: unnest token, reveal the name, back
    /// to interpret state
    ///
    pub fn f_semicolon(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.align_here();
        let at = self.kernel.here();
        self.kernel.comma(pack_xt(at, RID_UNNEST))?;
        self.set_latest_flag(FLAG_HIDDEN, false)?;
        self.kernel.store(STATE_ADDR, FALSE)
    }

    /// immediate ( -- ) marks the most recent definition
    pub fn f_immediate(&mut self, _pfa: usize) -> Result<()> {
        self.set_latest_flag(FLAG_IMMEDIATE, true)
    }

    /// ' <name> ( -- xt ) pushes the execution token of the next word
    pub fn f_tick(&mut self, _pfa: usize) -> Result<()> {
        let xt = self.tick()?;
        self.kernel.push(xt)
    }

    /// >body ( xt -- pfa ) extracts the parameter field address
    pub fn f_to_body(&mut self, _pfa: usize) -> Result<()> {
        let xt = self.kernel.pop()?;
        if xt < 0.0 {
            return Err(VmError::NotExecutable);
        }
        self.kernel.push(xt_pfa(xt) as f64)
    }

    /// execute ( xt -- ) runs the word whose token is on the stack
    pub fn f_execute(&mut self, _pfa: usize) -> Result<()> {
        let xt = self.kernel.pop()?;
        self.execute_xt(xt)
    }

    /// compile, ( xt -- ) appends a word reference to the open definition
    pub fn f_compile_comma(&mut self, _pfa: usize) -> Result<()> {
        let xt = self.kernel.pop()?;
        self.compile_xt(xt)
    }

    /// find ( a -- xt 1 | xt -1 | a 0 ) dictionary search on a counted string
    pub fn f_find(&mut self, _pfa: usize) -> Result<()> {
        let a = self.kernel.pop()?;
        let query = crate::kernel::Kernel::char_addr(a)?;
        let (xt, status) = self.find(query)?;
        self.kernel.push(xt)?;
        self.kernel.push(status as f64)
    }

    /// words ( -- ) lists the visible dictionary, newest first
    pub fn f_words(&mut self, _pfa: usize) -> Result<()> {
        let mut nfa = self.kernel.fetch(CURRENT_DEF_ADDR)? as usize;
        let mut out = String::new();
        while nfa != 0 {
            let flags = self.kernel.c_fetch(nfa + FLAGS_OFFSET)?;
            if flags & FLAG_HIDDEN == 0 {
                out.push_str(&self.kernel.string_get(nfa)?);
                out.push(' ');
            }
            nfa = self.kernel.fetch(nfa + LINK_OFFSET)? as usize;
        }
        out.push('\n');
        self.type_str(&out);
        Ok(())
    }

    /// see <name> ( -- ) shows what a word does
    ///     Builtins print their documentation string; colon definitions are
    ///     decompiled; data words show their current contents.
    ///
    pub fn f_see(&mut self, _pfa: usize) -> Result<()> {
        let (addr, len) = self.parse_name()?;
        if len == 0 {
            return Err(VmError::EmptyName);
        }
        let query = self.fold_for_lookup(addr, len)?;
        let (nfa, flags) = match self.find_header(query)? {
            Some(hit) => hit,
            None => return Err(VmError::UnknownWord),
        };
        let name = self.kernel.string_get(nfa)?;
        let xt = self.kernel.fetch(nfa + XT_OFFSET)?;
        let pfa = xt_pfa(xt);
        let contents = self.kernel.fetch(pfa).unwrap_or(0.0);
        let out = match xt_rid(xt) {
            RID_VARIABLE => format!("Variable: {} = {}\n", name, contents),
            RID_CONSTANT => format!("Constant: {} = {}\n", name, contents),
            RID_VALUE => format!("Value: {} = {}\n", name, contents),
            RID_NEST => self.decompile(&name, pfa, flags)?,
            rid => match self.builtin(rid.wrapping_sub(NATIVE_XT_ADDR)) {
                Some(b) => format!("Builtin: {}\n", b.doc),
                None => return Err(VmError::NotExecutable),
            },
        };
        self.type_str(&out);
        Ok(())
    }

    fn decompile(&mut self, name: &str, pfa: usize, flags: u8) -> Result<String> {
        let mut out = format!(": {} ", name);
        let mut at = pfa;
        loop {
            let xt = self.kernel.fetch(at)?;
            match xt_rid(xt) {
                RID_UNNEST => {
                    out.push(';');
                    if flags & FLAG_IMMEDIATE != 0 {
                        out.push_str(" immediate");
                    }
                    out.push('\n');
                    return Ok(out);
                }
                RID_NEXT => at = xt_pfa(xt) + CELL,
                RID_CELL => {
                    let lit = xt_pfa(xt);
                    out.push_str(&format!("{} ", self.kernel.fetch(lit)?));
                    at = lit + CELL;
                }
                _ => {
                    match self.name_for_xt(xt)? {
                        Some(word) => out.push_str(&format!("{} ", word)),
                        None => out.push_str("? "),
                    }
                    at += CELL;
                }
            }
        }
    }

    /// Reverse lookup: the dictionary name whose header carries this token.
    fn name_for_xt(&self, xt: f64) -> Result<Option<String>> {
        let mut nfa = self.kernel.fetch(CURRENT_DEF_ADDR)? as usize;
        while nfa != 0 {
            if self.kernel.fetch(nfa + XT_OFFSET)? == xt {
                return Ok(Some(self.kernel.string_get(nfa)?));
            }
            nfa = self.kernel.fetch(nfa + LINK_OFFSET)? as usize;
        }
        Ok(None)
    }

    /// Parse a name and resolve it to an execution token.
    fn tick(&mut self) -> Result<f64> {
        let (addr, len) = self.parse_name()?;
        if len == 0 {
            return Err(VmError::EmptyName);
        }
        let query = self.fold_for_lookup(addr, len)?;
        match self.find(query)? {
            (xt, status) if status != 0 => Ok(xt),
            _ => Err(VmError::UnknownWord),
        }
    }

    fn latest_header(&self) -> Result<usize> {
        Ok(self.kernel.fetch(CURRENT_DEF_ADDR)? as usize)
    }

    fn set_latest_rid(&mut self, rid: usize) -> Result<()> {
        let header = self.latest_header()?;
        let xt = pack_xt(header + HEADER_SIZE, rid);
        self.kernel.store(header + XT_OFFSET, xt)
    }

    fn set_latest_flag(&mut self, flag: u8, on: bool) -> Result<()> {
        let header = self.latest_header()?;
        let flags = self.kernel.c_fetch(header + FLAGS_OFFSET)?;
        let flags = if on { flags | flag } else { flags & !flag };
        self.kernel.c_store(header + FLAGS_OFFSET, flags)
    }
}

//////////////////////////////////////////////
/// TESTS
///
#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::POD_ADDR;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn capture() -> (ForthRuntime, Rc<RefCell<String>>) {
        let out = Rc::new(RefCell::new(String::new()));
        let sink = out.clone();
        let mut rt = ForthRuntime::with_output(Box::new(move |s| sink.borrow_mut().push_str(s)));
        rt.cold_start();
        (rt, out)
    }

    fn runtime() -> ForthRuntime {
        capture().0
    }

    #[test]
    fn test_depth_scenario() {
        let mut rt = runtime();
        rt.interpret("42 43 DEPTH");
        assert_eq!(rt.pop().unwrap(), 2.0);
        assert_eq!(rt.kernel.depth(), 2);
    }

    #[test]
    fn test_create_comma_fetch() {
        let mut rt = runtime();
        rt.interpret("CREATE foo   42 ,  foo @");
        assert_eq!(rt.pop().unwrap(), 42.0);
    }

    #[test]
    fn test_create_pushes_here_at_definition() {
        let mut rt = runtime();
        rt.interpret("CREATE mark");
        let here = rt.kernel.here();
        rt.interpret("mark");
        assert_eq!(rt.pop().unwrap(), here as f64);
    }

    #[test]
    fn test_variable_store_fetch() {
        let mut rt = runtime();
        rt.interpret("VARIABLE v   42 v !   v @");
        assert_eq!(rt.pop().unwrap(), 42.0);
    }

    #[test]
    fn test_constant_and_execute() {
        let mut rt = runtime();
        rt.interpret("42 CONSTANT c   ' c EXECUTE");
        assert_eq!(rt.pop().unwrap(), 42.0);
        rt.interpret("c");
        assert_eq!(rt.pop().unwrap(), 42.0);
    }

    #[test]
    fn test_value_and_to() {
        let mut rt = runtime();
        rt.interpret("42 VALUE v   v");
        assert_eq!(rt.pop().unwrap(), 42.0);
        rt.interpret("99 TO v   v");
        assert_eq!(rt.pop().unwrap(), 99.0);
    }

    #[test]
    fn test_colon_definition() {
        let mut rt = runtime();
        rt.interpret(": sq DUP * ;   6 sq");
        assert_eq!(rt.pop().unwrap(), 36.0);
    }

    #[test]
    fn test_colon_with_literal_and_tick() {
        let mut rt = runtime();
        rt.interpret(": fortytwo 21 DUP + ;   fortytwo");
        assert_eq!(rt.pop().unwrap(), 42.0);
        rt.interpret("' fortytwo EXECUTE");
        assert_eq!(rt.pop().unwrap(), 42.0);
    }

    #[test]
    fn test_definition_uses_live_stack() {
        let mut rt = runtime();
        rt.interpret("10 2 : f TUCK DUP + * + ;   f");
        assert_eq!(rt.pop().unwrap(), 42.0);
        assert_eq!(rt.kernel.depth(), 0);
    }

    #[test]
    fn test_nested_definitions() {
        let mut rt = runtime();
        rt.interpret(": sq DUP * ;");
        rt.interpret(": quad sq sq ;");
        rt.interpret("2 quad");
        assert_eq!(rt.pop().unwrap(), 16.0);
    }

    #[test]
    fn test_definition_spanning_lines() {
        let mut rt = runtime();
        rt.interpret(": g");
        rt.interpret("1 2 +");
        rt.interpret(";");
        rt.interpret("g");
        assert_eq!(rt.pop().unwrap(), 3.0);
    }

    #[test]
    fn test_unknown_word_aborts() {
        let (mut rt, out) = capture();
        rt.interpret("foo");
        assert!(out.borrow().contains("foo ?\n"));
        assert_eq!(rt.kernel.depth(), 0);
        assert_eq!(rt.kernel.r_depth(), 0);
    }

    #[test]
    fn test_dot_underflow_diagnostic() {
        let (mut rt, out) = capture();
        rt.interpret(".");
        assert!(out.borrow().contains(". Stack underflow\n"));
    }

    #[test]
    fn test_s_quote_scenario() {
        let mut rt = runtime();
        rt.interpret("S\" Hello\" SWAP DROP");
        assert_eq!(rt.pop().unwrap(), 5.0);
    }

    #[test]
    fn test_ok_prompt() {
        let (mut rt, out) = capture();
        rt.interpret("1 2 +");
        assert!(out.borrow().ends_with(" ok\n"));
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let mut rt = runtime();
        rt.interpret("42 CONSTANT Answer");
        rt.interpret("answer ANSWER AnSwEr + +");
        assert_eq!(rt.pop().unwrap(), 126.0);
    }

    #[test]
    fn test_find_most_recent_wins() {
        let mut rt = runtime();
        rt.interpret("1 CONSTANT x");
        rt.interpret("2 CONSTANT x");
        rt.interpret("x");
        assert_eq!(rt.pop().unwrap(), 2.0);
    }

    #[test]
    fn test_word_in_progress_is_hidden() {
        let (mut rt, out) = capture();
        rt.interpret(": selfref selfref ;");
        assert!(out.borrow().contains("selfref ?\n"));
    }

    #[test]
    fn test_immediate_flag_reported_by_find() {
        let mut rt = runtime();
        rt.interpret(": noted 1 ; IMMEDIATE");
        rt.kernel.string_set(POD_ADDR, "NOTED").unwrap();
        let (_, status) = rt.find(POD_ADDR).unwrap();
        assert_eq!(status, 1);
    }

    #[test]
    fn test_immediate_word_runs_while_compiling() {
        let mut rt = runtime();
        rt.interpret(": two 2 ; IMMEDIATE");
        rt.interpret(": four two two + ;"); // both twos execute during compilation
        assert_eq!(rt.kernel.depth(), 2);
        rt.interpret("four"); // the compiled body is just +
        assert_eq!(rt.pop().unwrap(), 4.0);
        assert_eq!(rt.kernel.depth(), 0);
    }

    #[test]
    fn test_abort_preserves_dictionary() {
        let (mut rt, out) = capture();
        rt.interpret(": sq DUP * ;");
        let here = rt.kernel.here();
        let head = rt.kernel.fetch(CURRENT_DEF_ADDR).unwrap();
        rt.interpret("1 2 3 nonsense");
        assert!(out.borrow().contains("nonsense ?\n"));
        assert_eq!(rt.kernel.depth(), 0);
        assert_eq!(rt.kernel.here(), here);
        assert_eq!(rt.kernel.fetch(CURRENT_DEF_ADDR).unwrap(), head);
        rt.interpret("7 sq");
        assert_eq!(rt.pop().unwrap(), 49.0);
    }

    #[test]
    fn test_to_body() {
        let mut rt = runtime();
        rt.interpret("42 CONSTANT c   ' c >BODY @");
        assert_eq!(rt.pop().unwrap(), 42.0);
    }

    #[test]
    fn test_tick_missing_word() {
        let (mut rt, out) = capture();
        rt.interpret("' gone");
        assert!(out.borrow().contains("gone ?\n"));
    }

    #[test]
    fn test_empty_name_diagnostic() {
        let (mut rt, out) = capture();
        rt.interpret("CREATE");
        assert!(out.borrow().contains(" Empty name\n"));
    }

    #[test]
    fn test_compile_comma_builds_running_body() {
        let mut rt = runtime();
        rt.kernel.string_set(POD_ADDR, "DUP").unwrap();
        let (dup, _) = rt.find(POD_ADDR).unwrap();
        rt.kernel.string_set(POD_ADDR, "+").unwrap();
        let (plus, _) = rt.find(POD_ADDR).unwrap();
        rt.kernel.align_here();
        let body = rt.kernel.here();
        rt.compile_literal(21.0).unwrap();
        rt.compile_xt(dup).unwrap();
        rt.compile_xt(plus).unwrap();
        let at = rt.kernel.here();
        rt.kernel.comma(pack_xt(at, RID_UNNEST)).unwrap();
        rt.run_body(body).unwrap();
        assert_eq!(rt.pop().unwrap(), 42.0);
    }

    #[test]
    fn test_dictionary_head_guard_diagnostic() {
        let (mut rt, out) = capture();
        rt.interpret("5 96 !");
        assert!(out.borrow().contains("! Wrong DSP_START_ADDR: 5\n"));
    }

    #[test]
    fn test_unaligned_fetch_diagnostic() {
        let (mut rt, out) = capture();
        rt.interpret("43 @");
        assert!(out.borrow().contains("@ Address is not aligned. Given: 43\n"));
    }

    #[test]
    fn test_find_word_statuses() {
        let mut rt = runtime();
        rt.kernel.string_set(POD_ADDR, "DUP").unwrap();
        rt.kernel.push(POD_ADDR as f64).unwrap();
        rt.f_find(0).unwrap();
        assert_eq!(rt.pop().unwrap(), -1.0);
        assert!(rt.pop().unwrap() > 0.0);

        rt.kernel.string_set(POD_ADDR, "ABSENT").unwrap();
        rt.kernel.push(POD_ADDR as f64).unwrap();
        rt.f_find(0).unwrap();
        assert_eq!(rt.pop().unwrap(), 0.0);
        assert_eq!(rt.pop().unwrap(), POD_ADDR as f64);
    }

    #[test]
    fn test_words_lists_dictionary() {
        let (mut rt, out) = capture();
        rt.interpret("WORDS");
        let text = out.borrow();
        assert!(text.contains("DUP"));
        assert!(text.contains("CREATE"));
    }

    #[test]
    fn test_see_builtin() {
        let (mut rt, out) = capture();
        rt.interpret("SEE DUP");
        assert!(out.borrow().contains("Builtin:"));
    }

    #[test]
    fn test_see_colon_definition() {
        let (mut rt, out) = capture();
        rt.interpret(": sq DUP * ;");
        rt.interpret("SEE sq");
        assert!(out.borrow().contains(": SQ DUP * ;"));
    }

    #[test]
    fn test_see_constant() {
        let (mut rt, out) = capture();
        rt.interpret("6 CONSTANT six");
        rt.interpret("SEE six");
        assert!(out.borrow().contains("Constant: SIX = 6"));
    }

    #[test]
    fn test_long_names_truncate_consistently() {
        let mut rt = runtime();
        let name = "a-really-long-word-name-over-thirty-chars";
        rt.interpret(&format!("7 CONSTANT {}", name));
        rt.interpret(name);
        assert_eq!(rt.pop().unwrap(), 7.0);
    }
}

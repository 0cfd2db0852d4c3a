//////////////////////////////////////////////////////////////////
/// runtime.rs
///
/// Forth Runtime Engine
///
/// This module defines the ForthRuntime struct, which contains the state of
/// the Forth interpreter: the kernel with the memory image, the table of
/// native actions, and the output sink. It provides the cold_start
/// initialization and the two-operation host façade: interpret() and pop().
///
use crate::error::{Result, VmError};
use crate::kernel::{
    pack_xt, Kernel, CURRENT_DEF_ADDR, FALSE, FLAGS_OFFSET, FLAG_HIDDEN, HEADER_SIZE, LINK_OFFSET,
    MEMORY_SIZE, NAME_MAX, NATIVE_XT_ADDR, PARSE_WORD_ADDR, STATE_ADDR, TIB_ADDR, TIB_COUNT_ADDR,
    TIB_SIZE, TO_IN_ADDR, XT_OFFSET,
};

// Runtime ids of the seven internal actions, installed first so their table
// indices are fixed.
pub const RID_VARIABLE: usize = NATIVE_XT_ADDR;
pub const RID_CONSTANT: usize = NATIVE_XT_ADDR + 1;
pub const RID_VALUE: usize = NATIVE_XT_ADDR + 2;
pub const RID_NEST: usize = NATIVE_XT_ADDR + 3;
pub const RID_UNNEST: usize = NATIVE_XT_ADDR + 4;
pub const RID_NEXT: usize = NATIVE_XT_ADDR + 5;
pub const RID_CELL: usize = NATIVE_XT_ADDR + 6;

/// The signature of every native action: the runtime and the parameter field
/// address decoded from the execution token.
pub type WordFn = fn(&mut ForthRuntime, usize) -> Result<()>;

/// The internal format for builtins: a name, code pointer, and documentation
/// string for use by SEE.
pub struct BuiltInFn {
    pub name: String,
    pub code: WordFn,
    pub doc: String,
}

impl BuiltInFn {
    pub fn new(name: String, code: WordFn, doc: String) -> BuiltInFn {
        BuiltInFn { name, code, doc }
    }
}

/// The write sink: every character the interpreter emits goes through this.
pub type OutputFn = Box<dyn FnMut(&str)>;

pub struct ForthRuntime {
    pub kernel: Kernel,          // image, registers, stacks
    builtins: Vec<BuiltInFn>,    // native actions, indexed by rid - base
    output: OutputFn,            // host-provided text sink
    running: bool,               // re-entry guard for interpret()
    exit_flag: bool,             // set when the BYE word is executed
}

impl ForthRuntime {
    /// A runtime writing to stdout.
    pub fn new() -> ForthRuntime {
        ForthRuntime::with_output(Box::new(|s| print!("{s}")))
    }

    /// A runtime writing through the given sink.
    pub fn with_output(output: OutputFn) -> ForthRuntime {
        ForthRuntime {
            kernel: Kernel::new(),
            builtins: Vec::new(),
            output,
            running: false,
            exit_flag: false,
        }
    }

    /// cold_start installs the internal runtimes and the builtin words.
    /// Must run once before the first interpret() call.
    ///
    pub fn cold_start(&mut self) {
        self.build_dictionary()
            .expect("builtin dictionary fits the image");
        log::debug!("cold start: {} native actions installed", self.builtins.len());
    }

    pub(crate) fn type_str(&mut self, s: &str) {
        (self.output)(s);
    }

    pub(crate) fn builtin(&self, index: usize) -> Option<&BuiltInFn> {
        self.builtins.get(index)
    }

    /// interpret processes one line of source text to completion. Errors are
    /// reported through the sink and never escape.
    ///
    pub fn interpret(&mut self, text: &str) {
        if self.running {
            log::warn!("interpret re-entered; line dropped");
            return;
        }
        self.running = true;
        self.interpret_line(text);
        self.running = false;
    }

    /// pop removes and returns the top data-stack cell.
    pub fn pop(&mut self) -> Result<f64> {
        self.kernel.pop()
    }

    /// should_exit reports whether BYE has been executed.
    pub fn should_exit(&self) -> bool {
        self.exit_flag
    }

    fn interpret_line(&mut self, text: &str) {
        if let Err(e) = self.load_input(text) {
            self.report_abort(e);
            return;
        }
        self.echo_input();
        loop {
            match self.interpret_token() {
                Ok(true) => {}
                Ok(false) => {
                    self.type_str(" ok\n");
                    break;
                }
                Err(e) => {
                    self.report_abort(e);
                    break;
                }
            }
        }
    }

    /// load_input copies up to 254 characters into the input buffer, appends
    /// one trailing blank, blank-pads the rest, and rewinds the cursor.
    ///
    pub(crate) fn load_input(&mut self, text: &str) -> Result<()> {
        let bytes = text.as_bytes();
        let len = bytes.len().min(TIB_SIZE - 2);
        for (i, b) in bytes[..len].iter().enumerate() {
            self.kernel.c_store(TIB_ADDR + i, *b)?;
        }
        for i in len..TIB_SIZE - 1 {
            self.kernel.c_store(TIB_ADDR + i, b' ')?;
        }
        self.kernel.c_store(TIB_ADDR + TIB_SIZE - 1, 0)?;
        self.kernel.store(TIB_COUNT_ADDR, (len + 1) as f64)?;
        self.kernel.store(TO_IN_ADDR, 0.0)
    }

    fn echo_input(&mut self) {
        let count = self.kernel.fetch(TIB_COUNT_ADDR).unwrap_or(0.0) as usize;
        let shown = self
            .token_text(TIB_ADDR, count.saturating_sub(1))
            .unwrap_or_default();
        self.type_str(&shown);
        self.type_str("\n");
    }

    /// On any error: abort, then echo the offending token and the diagnostic.
    fn report_abort(&mut self, e: VmError) {
        let _ = self.f_abort(0);
        let token = self.kernel.string_get(PARSE_WORD_ADDR).unwrap_or_default();
        self.type_str(&format!("{} {}\n", token, e));
    }

    /// abort ( -- ) empties the data stack, then does everything QUIT does
    ///
    pub fn f_abort(&mut self, pfa: usize) -> Result<()> {
        self.kernel.clear_data_stack();
        self.f_quit(pfa)
    }

    /// quit ( -- ) empties the return stack, discards the input line, and
    /// returns to interpret state. Definitions and HERE are untouched.
    ///
    pub fn f_quit(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.clear_return_stack();
        for i in 0..TIB_SIZE - 1 {
            self.kernel.c_store(TIB_ADDR + i, b' ')?;
        }
        self.kernel.c_store(TIB_ADDR + TIB_SIZE - 1, 0)?;
        self.kernel.store(TIB_COUNT_ADDR, 0.0)?;
        self.kernel.store(TO_IN_ADDR, 0.0)?;
        self.kernel.store(STATE_ADDR, FALSE)
    }

    /// bye ( -- ) asks the embedding host to stop feeding lines
    pub fn f_bye(&mut self, _pfa: usize) -> Result<()> {
        self.exit_flag = true;
        Ok(())
    }

    /// Install one word: a table slot for the code and a dictionary header
    /// whose token packs the header's parameter field with the slot's id.
    ///
    fn add_builtin(&mut self, name: &str, code: WordFn, doc: &str) -> Result<()> {
        self.add_entry(name, 0, code, doc)
    }

    /// The internal runtimes get nameless, hidden headers so FIND can never
    /// return them.
    fn add_runtime(&mut self, code: WordFn, doc: &str) -> Result<()> {
        self.add_entry("", FLAG_HIDDEN, code, doc)
    }

    fn add_entry(&mut self, name: &str, flags: u8, code: WordFn, doc: &str) -> Result<()> {
        let rid = NATIVE_XT_ADDR + self.builtins.len();
        self.builtins
            .push(BuiltInFn::new(name.to_string(), code, doc.to_string()));
        self.kernel.align_here();
        let header = self.kernel.here();
        if header + HEADER_SIZE >= MEMORY_SIZE {
            return Err(VmError::OutOfMemory);
        }
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_MAX);
        self.kernel.c_store(header, len as u8)?;
        for (i, b) in bytes[..len].iter().enumerate() {
            self.kernel.c_store(header + 1 + i, *b)?;
        }
        self.kernel.c_store(header + FLAGS_OFFSET, flags)?;
        let prev = self.kernel.fetch(CURRENT_DEF_ADDR)?;
        self.kernel.store(header + LINK_OFFSET, prev)?;
        self.kernel
            .store(header + XT_OFFSET, pack_xt(header + HEADER_SIZE, rid))?;
        self.kernel.store(CURRENT_DEF_ADDR, header as f64)?;
        self.kernel.set_here(header + HEADER_SIZE);
        Ok(())
    }

    /// Set up all the words that are implemented in Rust.
    ///     Each one gets a standard dictionary header and a slot in the
    ///     builtins table. The first seven slots are the internal runtimes
    ///     and must not move.
    fn build_dictionary(&mut self) -> Result<()> {
        self.kernel.store(CURRENT_DEF_ADDR, 0.0)?;
        self.f_quit(0)?;

        self.add_runtime(ForthRuntime::rts_variable, "push the parameter field address")?;
        self.add_runtime(ForthRuntime::rts_constant, "push the cell at the parameter field")?;
        self.add_runtime(ForthRuntime::rts_value, "push the cell at the parameter field (TO can rewrite it)")?;
        self.add_runtime(ForthRuntime::rts_nest, "enter a colon definition")?;
        self.add_runtime(ForthRuntime::rts_unnest, "leave a colon definition")?;
        self.add_runtime(ForthRuntime::rts_next, "chain to the following cell")?;
        self.add_runtime(ForthRuntime::rts_cell, "push an inline literal, then chain")?;

        self.add_builtin("+", ForthRuntime::f_plus, "+ ( j k -- j+k ) Push j+k on the stack")?;
        self.add_builtin("-", ForthRuntime::f_minus, "- ( j k -- j-k ) Push j-k on the stack")?;
        self.add_builtin("*", ForthRuntime::f_times, "* ( j k -- j*k ) Push j*k on the stack")?;
        self.add_builtin("/", ForthRuntime::f_divide, "/ ( j k -- j/k ) Push j/k on the stack")?;
        self.add_builtin("MOD", ForthRuntime::f_mod, "mod ( j k -- j%k ) Push the remainder of j/k")?;
        self.add_builtin("NEGATE", ForthRuntime::f_negate, "negate ( n -- -n )")?;
        self.add_builtin("ABS", ForthRuntime::f_abs, "abs ( n -- |n| )")?;
        self.add_builtin("MIN", ForthRuntime::f_min, "min ( j k -- min ) Push the smaller of j and k")?;
        self.add_builtin("MAX", ForthRuntime::f_max, "max ( j k -- max ) Push the larger of j and k")?;
        self.add_builtin("1+", ForthRuntime::f_one_plus, "1+ ( n -- n+1 )")?;
        self.add_builtin("1-", ForthRuntime::f_one_minus, "1- ( n -- n-1 )")?;
        self.add_builtin("2*", ForthRuntime::f_two_times, "2* ( n -- n*2 )")?;
        self.add_builtin("2/", ForthRuntime::f_two_divide, "2/ ( n -- n/2 )")?;
        self.add_builtin("=", ForthRuntime::f_equal, "= ( j k -- b ) If j == k push true else false")?;
        self.add_builtin("<>", ForthRuntime::f_not_equal, "<> ( j k -- b ) If j != k push true else false")?;
        self.add_builtin("<", ForthRuntime::f_less, "< ( j k -- b ) If j < k push true else false")?;
        self.add_builtin(">", ForthRuntime::f_greater, "> ( j k -- b ) If j > k push true else false")?;
        self.add_builtin("0=", ForthRuntime::f_0equal, "0= ( j -- b ) If j == 0 push true else false")?;
        self.add_builtin("0<", ForthRuntime::f_0less, "0< ( j -- b ) If j < 0 push true else false")?;
        self.add_builtin("0>", ForthRuntime::f_0greater, "0> ( j -- b ) If j > 0 push true else false")?;
        self.add_builtin(
            "TRUE",
            ForthRuntime::f_true,
            "true ( -- -1 ) Push the canonical true value on the stack",
        )?;
        self.add_builtin(
            "FALSE",
            ForthRuntime::f_false,
            "false ( -- 0 ) Push the canonical false value on the stack",
        )?;
        self.add_builtin("AND", ForthRuntime::f_and, "and ( a b -- a&b ) Bitwise and")?;
        self.add_builtin("OR", ForthRuntime::f_or, "or ( a b -- a|b ) Bitwise or")?;
        self.add_builtin("XOR", ForthRuntime::f_xor, "xor ( a b -- a^b ) Bitwise exclusive or")?;
        self.add_builtin("INVERT", ForthRuntime::f_invert, "invert ( a -- ~a ) Bitwise complement")?;
        self.add_builtin(
            "DUP",
            ForthRuntime::f_dup,
            "dup ( n -- n n ) Push a second copy of the top of stack",
        )?;
        self.add_builtin(
            "?DUP",
            ForthRuntime::f_q_dup,
            "?dup ( n -- n n | 0 ) Duplicate the top of stack unless it is zero",
        )?;
        self.add_builtin(
            "DROP",
            ForthRuntime::f_drop,
            "drop ( n -- ) Pop the top element off the stack",
        )?;
        self.add_builtin(
            "SWAP",
            ForthRuntime::f_swap,
            "swap ( m n -- n m ) Reverse the order of the top two stack elements",
        )?;
        self.add_builtin(
            "OVER",
            ForthRuntime::f_over,
            "over ( m n -- m n m ) Push a copy of the second item on the stack",
        )?;
        self.add_builtin(
            "ROT",
            ForthRuntime::f_rot,
            "rot ( i j k -- j k i ) Move the third stack item to the top",
        )?;
        self.add_builtin(
            "-ROT",
            ForthRuntime::f_minus_rot,
            "-rot ( i j k -- k i j ) Move the top of the stack under the next two",
        )?;
        self.add_builtin("NIP", ForthRuntime::f_nip, "nip ( m n -- n ) Drop the second item")?;
        self.add_builtin(
            "TUCK",
            ForthRuntime::f_tuck,
            "tuck ( m n -- n m n ) Copy the top of the stack under the second item",
        )?;
        self.add_builtin(
            "PICK",
            ForthRuntime::f_pick,
            "pick ( .. n -- .. v ) Push a copy of the nth item on the stack (after removing n)",
        )?;
        self.add_builtin("DEPTH", ForthRuntime::f_depth, "depth ( -- n ) Push the current stack depth")?;
        self.add_builtin("2DUP", ForthRuntime::f_two_dup, "2dup ( m n -- m n m n )")?;
        self.add_builtin("2DROP", ForthRuntime::f_two_drop, "2drop ( m n -- )")?;
        self.add_builtin(
            ">R",
            ForthRuntime::f_to_r,
            ">r ( n -- ) Pop stack and push value to return stack",
        )?;
        self.add_builtin(
            "R>",
            ForthRuntime::f_r_from,
            "r> ( -- n ) Pop return stack and push value to calculation stack",
        )?;
        self.add_builtin(
            "R@",
            ForthRuntime::f_r_get,
            "r@ ( -- n ) Copy the top of the return stack to the calculation stack",
        )?;
        self.add_builtin("@", ForthRuntime::f_get, "@ ( a -- v ) Push the cell stored at address a")?;
        self.add_builtin("!", ForthRuntime::f_store, "! ( v a -- ) Store v at address a")?;
        self.add_builtin("+!", ForthRuntime::f_plus_store, "+! ( v a -- ) Add v to the cell at address a")?;
        self.add_builtin("C@", ForthRuntime::f_c_get, "c@ ( a -- c ) Push the character at address a")?;
        self.add_builtin("C!", ForthRuntime::f_c_store, "c! ( c a -- ) Store character c at address a")?;
        self.add_builtin(
            ",",
            ForthRuntime::f_comma,
            ", ( n -- ) Append the top of the stack to the dictionary",
        )?;
        self.add_builtin("C,", ForthRuntime::f_c_comma, "c, ( c -- ) Append one character to the dictionary")?;
        self.add_builtin("ALLOT", ForthRuntime::f_allot, "allot ( n -- ) Reserve n bytes of dictionary space")?;
        self.add_builtin("ALIGN", ForthRuntime::f_align, "align ( -- ) Round HERE up to a cell boundary")?;
        self.add_builtin("ALIGNED", ForthRuntime::f_aligned, "aligned ( a -- a' ) Round a up to a cell boundary")?;
        self.add_builtin("HERE", ForthRuntime::f_here, "here ( -- a ) Push the dictionary pointer")?;
        self.add_builtin("CELL+", ForthRuntime::f_cell_plus, "cell+ ( a -- a+8 )")?;
        self.add_builtin("CELLS", ForthRuntime::f_cells, "cells ( n -- n*8 )")?;
        self.add_builtin("CHAR+", ForthRuntime::f_char_plus, "char+ ( a -- a+1 )")?;
        self.add_builtin("COUNT", ForthRuntime::f_count, "count ( a -- a+1 u ) Unpack a counted string")?;
        self.add_builtin("STATE", ForthRuntime::f_state, "state ( -- a ) Push the address of the STATE cell")?;
        self.add_builtin(">IN", ForthRuntime::f_to_in, ">in ( -- a ) Push the address of the input cursor")?;
        self.add_builtin("EMIT", ForthRuntime::f_emit, "emit ( c -- ) Send character c to the output sink")?;
        self.add_builtin("TYPE", ForthRuntime::f_type, "type ( a u -- ) Send u characters starting at a")?;
        self.add_builtin("CR", ForthRuntime::f_cr, "cr ( -- ) Start a new output line")?;
        self.add_builtin("SPACE", ForthRuntime::f_space, "space ( -- ) Emit one blank")?;
        self.add_builtin("SPACES", ForthRuntime::f_spaces, "spaces ( n -- ) Emit n blanks")?;
        self.add_builtin("BL", ForthRuntime::f_bl, "bl ( -- 32 ) Push the blank character")?;
        self.add_builtin(".", ForthRuntime::f_dot, ". ( n -- ) Print the top of the stack")?;
        self.add_builtin(".S", ForthRuntime::f_dot_s, ".s ( -- ) Print the contents of the calculation stack")?;
        self.add_builtin(
            "S\"",
            ForthRuntime::f_s_quote,
            "s\" ( -- a u ) Parse text up to the closing quote and push it",
        )?;
        self.add_builtin("SOURCE", ForthRuntime::f_source, "source ( -- a u ) Push the input buffer and its count")?;
        self.add_builtin("PARSE", ForthRuntime::f_parse, "parse ( c -- a u ) Parse a c-delimited token")?;
        self.add_builtin(
            "PARSE-NAME",
            ForthRuntime::f_parse_name,
            "parse-name ( -- a u ) Parse the next blank-delimited token",
        )?;
        self.add_builtin(
            "WORD",
            ForthRuntime::f_word,
            "word ( c -- a ) Parse a c-delimited token to a counted string",
        )?;
        self.add_builtin("CHAR", ForthRuntime::f_char, "char ( -- c ) Push the first character of the next token")?;
        self.add_builtin(
            ">NUMBER",
            ForthRuntime::f_to_number,
            ">number ( a u -- n u2 ) Convert a signed decimal; u2 is the unconverted count",
        )?;
        self.add_builtin(
            ">UPPERCASE",
            ForthRuntime::f_to_uppercase,
            ">uppercase ( a u dst -- dst ) Fold a token to an uppercase counted string",
        )?;
        self.add_builtin(
            "CREATE",
            ForthRuntime::f_create,
            "create <name> ( -- ) Make a dictionary entry that pushes its parameter field",
        )?;
        self.add_builtin(
            "VARIABLE",
            ForthRuntime::f_variable,
            "variable <name> ( -- ) Create a word holding one rewritable cell",
        )?;
        self.add_builtin(
            "CONSTANT",
            ForthRuntime::f_constant,
            "constant <name> ( n -- ) Create a word that pushes n",
        )?;
        self.add_builtin(
            "VALUE",
            ForthRuntime::f_value,
            "value <name> ( n -- ) Like constant, but TO can change it",
        )?;
        self.add_builtin("TO", ForthRuntime::f_to, "to <name> ( n -- ) Store n in the named word")?;
        self.add_builtin(":", ForthRuntime::f_colon, ": <name> ( -- ) Start a new definition")?;
        self.add_builtin(
            ";",
            ForthRuntime::f_semicolon,
            "; ( -- ) Terminate a definition, resetting to interpret mode",
        )?;
        self.f_immediate(0)?; // ; must run even while compiling
        self.add_builtin(
            "IMMEDIATE",
            ForthRuntime::f_immediate,
            "immediate ( -- ) Mark the most recent definition to execute while compiling",
        )?;
        self.add_builtin("'", ForthRuntime::f_tick, "' <name> ( -- xt ) Push a word's execution token")?;
        self.add_builtin(">BODY", ForthRuntime::f_to_body, ">body ( xt -- a ) Extract the parameter field address")?;
        self.add_builtin(
            "EXECUTE",
            ForthRuntime::f_execute,
            "execute ( xt -- ) Run the word whose token is on the stack",
        )?;
        self.add_builtin(
            "COMPILE,",
            ForthRuntime::f_compile_comma,
            "compile, ( xt -- ) Append a word reference to the open definition",
        )?;
        self.add_builtin(
            "FIND",
            ForthRuntime::f_find,
            "find ( a -- xt 1 | xt -1 | a 0 ) Search the dictionary for a counted-string name",
        )?;
        self.add_builtin("WORDS", ForthRuntime::f_words, "words ( -- ) List the visible dictionary")?;
        self.add_builtin("SEE", ForthRuntime::f_see, "see <name> ( -- ) Decompile and print a word")?;
        self.add_builtin(
            "ABORT",
            ForthRuntime::f_abort,
            "abort ( -- ) Clear both stacks and return to interpret state",
        )?;
        self.add_builtin(
            "QUIT",
            ForthRuntime::f_quit,
            "quit ( -- ) Clear the return stack and the input line",
        )?;
        self.add_builtin("BYE", ForthRuntime::f_bye, "bye ( -- ) Leave the interpreter loop")?;
        Ok(())
    }
}

impl Default for ForthRuntime {
    fn default() -> Self {
        let mut rt = ForthRuntime::new();
        rt.cold_start();
        rt
    }
}

/// Inner Interpreter
///
/// Core functions to execute an execution token and to thread through the
/// body of a colon definition.
///
use crate::error::{Result, VmError};
use crate::kernel::{xt_pfa, xt_rid, CELL, NATIVE_XT_ADDR};
use crate::runtime::{
    ForthRuntime, RID_CELL, RID_CONSTANT, RID_NEST, RID_NEXT, RID_UNNEST, RID_VALUE, RID_VARIABLE,
};

impl ForthRuntime {
    /// EXECUTE an execution token: decode (pfa, rid) and call the native
    /// action registered under the runtime id, handing it the pfa.
    ///
    pub fn execute_xt(&mut self, xt: f64) -> Result<()> {
        let entry = self.native_action(xt)?;
        log::trace!("execute {} (pfa {})", entry.name, xt_pfa(xt));
        let code = entry.code;
        code(self, xt_pfa(xt))
    }

    /// Look up the native action for a token, rejecting anything whose
    /// runtime id is not in the table.
    fn native_action(&self, xt: f64) -> Result<&crate::runtime::BuiltInFn> {
        if !xt.is_finite() || xt < 0.0 || xt.fract() != 0.0 {
            return Err(VmError::NotExecutable);
        }
        let rid = xt_rid(xt);
        let index = rid.wrapping_sub(NATIVE_XT_ADDR);
        self.builtin(index).ok_or(VmError::NotExecutable)
    }

    /// Places the parameter field address on the stack
    ///
    ///    [ header | pfa: data... ] - the runtime behind CREATE and VARIABLE
    ///
    pub fn rts_variable(&mut self, pfa: usize) -> Result<()> {
        self.kernel.push(pfa as f64)
    }

    /// Places the value of the adjacent constant on the stack
    ///
    pub fn rts_constant(&mut self, pfa: usize) -> Result<()> {
        let val = self.kernel.fetch(pfa)?;
        self.kernel.push(val)
    }

    /// Same fetch as a constant, but the cell is rewritable via TO
    ///
    pub fn rts_value(&mut self, pfa: usize) -> Result<()> {
        let val = self.kernel.fetch(pfa)?;
        self.kernel.push(val)
    }

    /// Enter a colon definition whose body starts at pfa
    ///
    pub fn rts_nest(&mut self, pfa: usize) -> Result<()> {
        self.run_body(pfa)
    }

    /// Leave a colon definition: pop the return stack and drop
    ///
    pub fn rts_unnest(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.r_pop()?;
        Ok(())
    }

    /// Push the cell at the given address: the chaining step stored after
    /// every compiled word
    ///
    pub fn rts_next(&mut self, pfa: usize) -> Result<()> {
        let val = self.kernel.fetch(pfa)?;
        self.kernel.push(val)
    }

    /// Push the literal at the given address, then execute the token one
    /// cell past it
    ///
    pub fn rts_cell(&mut self, pfa: usize) -> Result<()> {
        let val = self.kernel.fetch(pfa)?;
        self.kernel.push(val)?;
        let next = self.kernel.fetch(pfa + CELL)?;
        self.execute_xt(next)
    }

    /// run_body ( pfa -- ) threads through a compiled definition
    ///
    ///    An instruction pointer steps through the cells of the body. Each
    ///    cell is an execution token: a word reference followed by its
    ///    chaining token, a literal marker followed by the value, or the
    ///    terminating unnest token. A nested definition pushes the resume
    ///    address on the return stack and continues inside the callee; unnest
    ///    pops it back. The outermost frame is marked with a zero, so popping
    ///    zero means the definition that was entered here has finished.
    ///
    pub fn run_body(&mut self, pfa: usize) -> Result<()> {
        self.kernel.r_push(0.0)?;
        let mut ip = pfa;
        loop {
            let xt = self.kernel.fetch(ip)?;
            let code = self.native_action(xt)?.code;
            let arg = xt_pfa(xt);
            match xt_rid(xt) {
                RID_UNNEST => {
                    let resume = self.kernel.r_pop()?;
                    if resume == 0.0 {
                        return Ok(());
                    }
                    ip = resume as usize;
                }
                RID_NEXT => ip = arg + CELL,
                RID_CELL => {
                    let val = self.kernel.fetch(arg)?;
                    self.kernel.push(val)?;
                    ip = arg + CELL;
                }
                RID_NEST => {
                    self.kernel.r_push((ip + CELL) as f64)?;
                    ip = arg;
                }
                RID_VARIABLE => {
                    self.kernel.push(arg as f64)?;
                    ip += CELL;
                }
                RID_CONSTANT | RID_VALUE => {
                    let val = self.kernel.fetch(arg)?;
                    self.kernel.push(val)?;
                    ip += CELL;
                }
                _ => {
                    code(self, arg)?;
                    ip += CELL;
                }
            }
        }
    }
}

//////////////////////////////////////////////
/// TESTS
///
#[cfg(test)]
mod tests {
    use crate::error::VmError;
    use crate::kernel::pack_xt;
    use crate::runtime::ForthRuntime;

    fn runtime() -> ForthRuntime {
        let mut rt = ForthRuntime::new();
        rt.cold_start();
        rt
    }

    #[test]
    fn test_execute_rejects_bad_rid() {
        let mut rt = runtime();
        assert_eq!(rt.execute_xt(pack_xt(10_048, 500)), Err(VmError::NotExecutable));
        assert_eq!(rt.execute_xt(-1.0), Err(VmError::NotExecutable));
        assert_eq!(rt.execute_xt(0.5), Err(VmError::NotExecutable));
    }

    #[test]
    fn test_unnest_on_empty_return_stack() {
        let mut rt = runtime();
        assert_eq!(rt.rts_unnest(0), Err(VmError::StackUnderflow));
    }

    #[test]
    fn test_variable_runtime_pushes_pfa() {
        let mut rt = runtime();
        rt.rts_variable(10_048).unwrap();
        assert_eq!(rt.pop().unwrap(), 10_048.0);
    }

    #[test]
    fn test_constant_runtime_pushes_cell() {
        let mut rt = runtime();
        let here = rt.kernel.here();
        rt.kernel.comma(42.0).unwrap();
        rt.rts_constant(here).unwrap();
        assert_eq!(rt.pop().unwrap(), 42.0);
    }
}

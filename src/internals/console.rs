/// Output words
///
/// Every character the interpreter produces flows through the write sink the
/// host supplied at construction, so an embedding application can capture or
/// redirect the full output stream.
///
use crate::error::Result;
use crate::kernel::{Kernel, POD_ADDR};
use crate::runtime::ForthRuntime;

impl ForthRuntime {
    /// emit ( c -- ) sends character c to the sink.
    ///     Anything outside the printable ASCII range is shown as '?'.
    ///
    pub fn f_emit(&mut self, _pfa: usize) -> Result<()> {
        let c = self.kernel.pop()? as i64;
        let c = if (32..=126).contains(&c) {
            c as u8 as char
        } else {
            '?'
        };
        self.type_str(&c.to_string());
        Ok(())
    }

    /// type ( a u -- ) sends u characters starting at address a
    ///
    pub fn f_type(&mut self, _pfa: usize) -> Result<()> {
        let u = self.kernel.pop()?;
        let a = self.kernel.pop()?;
        let addr = Kernel::char_addr(a)?;
        let len = if u < 0.0 { 0 } else { u as usize };
        let mut out = String::with_capacity(len);
        for i in 0..len {
            out.push(self.kernel.c_fetch(addr + i)? as char);
        }
        self.type_str(&out);
        Ok(())
    }

    /// cr ( -- ) starts a new output line
    pub fn f_cr(&mut self, _pfa: usize) -> Result<()> {
        self.type_str("\n");
        Ok(())
    }

    /// space ( -- ) emits one blank
    pub fn f_space(&mut self, _pfa: usize) -> Result<()> {
        self.type_str(" ");
        Ok(())
    }

    /// spaces ( n -- ) emits n blanks
    pub fn f_spaces(&mut self, _pfa: usize) -> Result<()> {
        let n = self.kernel.pop()?;
        if n > 0.0 {
            self.type_str(&" ".repeat(n as usize));
        }
        Ok(())
    }

    /// bl ( -- 32 ) pushes the blank character
    pub fn f_bl(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.push(32.0)
    }

    /// . ( n -- ) prints the top of the stack followed by one space
    ///
    pub fn f_dot(&mut self, _pfa: usize) -> Result<()> {
        let val = self.kernel.pop()?;
        self.type_str(&format!("{} ", val));
        Ok(())
    }

    /// .s ( -- ) prints the stack bottom-to-top, marking the top
    ///
    pub fn f_dot_s(&mut self, _pfa: usize) -> Result<()> {
        let depth = self.kernel.depth();
        let mut out = String::new();
        for i in (0..depth).rev() {
            out.push_str(&format!("{} ", self.kernel.pick(i)?));
        }
        out.push_str("<top");
        self.type_str(&out);
        Ok(())
    }

    /// s" ( -- a u ) parses text up to the closing quote and leaves it in POD
    ///
    pub fn f_s_quote(&mut self, _pfa: usize) -> Result<()> {
        let (addr, len) = self.parse(b'"')?;
        let len = len.min(255);
        self.kernel.c_store(POD_ADDR, len as u8)?;
        for i in 0..len {
            let c = self.kernel.c_fetch(addr + i)?;
            self.kernel.c_store(POD_ADDR + 1 + i, c)?;
        }
        self.kernel.push((POD_ADDR + 1) as f64)?;
        self.kernel.push(len as f64)
    }
}

/// Parsing words
///
/// The input buffer and the >IN cursor live in the image, so all parsing is
/// a scan over image bytes. Tokens handed to the dictionary are counted
/// strings; the most recent space-delimited token is also kept in the
/// parsed-word buffer for diagnostics.
///
use crate::error::{Result, VmError};
use crate::kernel::{
    Kernel, NAME_MAX, PARSE_WORD_ADDR, PARSE_WORD_SIZE, POD_ADDR, TIB_ADDR, TIB_COUNT_ADDR,
    TO_IN_ADDR,
};
use crate::runtime::ForthRuntime;

impl ForthRuntime {
    fn input_count(&self) -> Result<usize> {
        Ok(self.kernel.fetch(TIB_COUNT_ADDR)? as usize)
    }

    fn input_cursor(&self) -> Result<usize> {
        Ok(self.kernel.fetch(TO_IN_ADDR)? as usize)
    }

    fn set_input_cursor(&mut self, at: usize) -> Result<()> {
        self.kernel.store(TO_IN_ADDR, at as f64)
    }

    /// parse reads from >IN up to the delimiter or the end of the buffer,
    /// returning the token's (address, length) inside the buffer. >IN ends
    /// up one past the delimiter.
    ///
    pub fn parse(&mut self, delim: u8) -> Result<(usize, usize)> {
        let count = self.input_count()?;
        let start = self.input_cursor()?.min(count);
        let mut end = start;
        while end < count && self.kernel.c_fetch(TIB_ADDR + end)? != delim {
            end += 1;
        }
        self.set_input_cursor((end + 1).min(count))?;
        Ok((TIB_ADDR + start, end - start))
    }

    /// parse_name skips leading blanks, parses the next space-delimited
    /// token, and copies it into the parsed-word buffer for diagnostics.
    ///
    pub fn parse_name(&mut self) -> Result<(usize, usize)> {
        let count = self.input_count()?;
        let mut at = self.input_cursor()?;
        while at < count && self.kernel.c_fetch(TIB_ADDR + at)? == b' ' {
            at += 1;
        }
        self.set_input_cursor(at)?;
        let (addr, len) = self.parse(b' ')?;
        let kept = len.min(PARSE_WORD_SIZE - 1);
        self.kernel.c_store(PARSE_WORD_ADDR, kept as u8)?;
        for i in 0..kept {
            let c = self.kernel.c_fetch(addr + i)?;
            self.kernel.c_store(PARSE_WORD_ADDR + 1 + i, c)?;
        }
        Ok((addr, len))
    }

    /// Fold the current token to uppercase in POD, capped at the dictionary
    /// name limit, ready for FIND.
    ///
    pub fn fold_for_lookup(&mut self, addr: usize, len: usize) -> Result<usize> {
        self.kernel.uppercase_copy(addr, len.min(NAME_MAX), POD_ADDR)
    }

    /// Read a token out of the image as a host string.
    pub fn token_text(&self, addr: usize, len: usize) -> Result<String> {
        let mut s = String::with_capacity(len);
        for i in 0..len {
            s.push(self.kernel.c_fetch(addr + i)? as char);
        }
        Ok(s)
    }

    /// source ( -- a u ) pushes the input buffer address and count
    pub fn f_source(&mut self, _pfa: usize) -> Result<()> {
        let count = self.input_count()?;
        self.kernel.push(TIB_ADDR as f64)?;
        self.kernel.push(count as f64)
    }

    /// parse ( c -- a u ) parses a c-delimited token from the input buffer
    pub fn f_parse(&mut self, _pfa: usize) -> Result<()> {
        let delim = self.kernel.pop()? as i64 as u8;
        let (addr, len) = self.parse(delim)?;
        self.kernel.push(addr as f64)?;
        self.kernel.push(len as f64)
    }

    /// parse-name ( -- a u ) parses the next blank-delimited token
    pub fn f_parse_name(&mut self, _pfa: usize) -> Result<()> {
        let (addr, len) = self.parse_name()?;
        self.kernel.push(addr as f64)?;
        self.kernel.push(len as f64)
    }

    /// word ( c -- a ) legacy parser: skips leading delimiters, then leaves
    /// the token as a counted string in POD
    ///
    pub fn f_word(&mut self, _pfa: usize) -> Result<()> {
        let delim = self.kernel.pop()? as i64 as u8;
        let count = self.input_count()?;
        let mut at = self.input_cursor()?;
        while at < count && self.kernel.c_fetch(TIB_ADDR + at)? == delim {
            at += 1;
        }
        self.set_input_cursor(at)?;
        let (addr, len) = self.parse(delim)?;
        let len = len.min(254);
        self.kernel.c_store(POD_ADDR, len as u8)?;
        for i in 0..len {
            let c = self.kernel.c_fetch(addr + i)?;
            self.kernel.c_store(POD_ADDR + 1 + i, c)?;
        }
        self.kernel.push(POD_ADDR as f64)
    }

    /// char ( -- c ) parses a token and pushes its first character
    pub fn f_char(&mut self, _pfa: usize) -> Result<()> {
        let (addr, len) = self.parse_name()?;
        if len == 0 {
            return Err(VmError::EmptyName);
        }
        let c = self.kernel.c_fetch(addr)?;
        self.kernel.push(c as f64)
    }

    /// >number ( a u -- n u2 ) parses a signed decimal integer, returning the
    /// value and the number of unconverted characters
    ///
    pub fn f_to_number(&mut self, _pfa: usize) -> Result<()> {
        let u = self.kernel.pop()?;
        let a = self.kernel.pop()?;
        let addr = Kernel::char_addr(a)?;
        let len = if u < 0.0 { 0 } else { u as usize };
        let text = self.token_text(addr, len)?;
        let (value, remaining) = number_prefix(&text);
        self.kernel.push(value)?;
        self.kernel.push(remaining as f64)
    }

    /// >uppercase ( a u dst -- dst ) folds a token into a counted uppercase
    /// string at dst
    ///
    pub fn f_to_uppercase(&mut self, _pfa: usize) -> Result<()> {
        let d = self.kernel.pop()?;
        let u = self.kernel.pop()?;
        let a = self.kernel.pop()?;
        let dst = Kernel::char_addr(d)?;
        let src = Kernel::char_addr(a)?;
        let len = if u < 0.0 { 0 } else { u as usize };
        let dst = self.kernel.uppercase_copy(src, len, dst)?;
        self.kernel.push(dst as f64)
    }
}

/// Accumulate a signed decimal prefix of `text`. Returns the value and the
/// count of characters that did not convert; a token with no digits converts
/// nothing at all.
///
pub fn number_prefix(text: &str) -> (f64, usize) {
    let bytes = text.as_bytes();
    let mut at = 0;
    let mut sign = 1.0;
    if at < bytes.len() && (bytes[at] == b'+' || bytes[at] == b'-') {
        sign = if bytes[at] == b'-' { -1.0 } else { 1.0 };
        at += 1;
    }
    let digits_from = at;
    let mut value = 0.0;
    while at < bytes.len() && bytes[at].is_ascii_digit() {
        value = value * 10.0 + (bytes[at] - b'0') as f64;
        at += 1;
    }
    if at == digits_from {
        // no digits at all, nothing converted
        return (0.0, bytes.len());
    }
    (sign * value, bytes.len() - at)
}

/// Parse a complete token as a number, or refuse it.
pub fn number(text: &str) -> Option<f64> {
    match number_prefix(text) {
        (value, 0) if !text.is_empty() => Some(value),
        _ => None,
    }
}

// Error conditions raised by the kernel and the word set.
//
// The Display text of each variant is the exact diagnostic the outer
// interpreter prints after the offending token, so these strings are part of
// the observable behavior and must not be reworded.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    /// Pop or pick on an empty data or return stack.
    #[error("Stack underflow")]
    StackUnderflow,

    /// Push past the fixed stack region.
    #[error("Stack overflow")]
    StackOverflow,

    /// Token is neither a defined word nor a number.
    #[error("?")]
    UnknownWord,

    /// A defining word reached the end of input without a name.
    #[error("Empty name")]
    EmptyName,

    /// EXECUTE was handed a value whose runtime id is not in the table.
    #[error("Not an executable")]
    NotExecutable,

    /// Cell store/fetch on an address that is not a multiple of 8.
    #[error("Address is not aligned. Given: {0}")]
    NotAligned(f64),

    /// Any access outside the memory image.
    #[error("Address out of range: {0}")]
    OutOfRange(f64),

    /// Refused write of a bogus value into the latest-definition cell.
    #[error("Wrong DSP_START_ADDR: {0}")]
    WrongDictionaryHead(f64),

    /// The dictionary pointer ran past the end of the image.
    #[error("Out of memory")]
    OutOfMemory,
}

pub type Result<T> = std::result::Result<T, VmError>;

//////////////////////////////////////////////
/// TESTS
///
#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(VmError::StackUnderflow, "Stack underflow")]
    #[case(VmError::UnknownWord, "?")]
    #[case(VmError::EmptyName, "Empty name")]
    #[case(VmError::NotExecutable, "Not an executable")]
    #[case(VmError::NotAligned(43.0), "Address is not aligned. Given: 43")]
    #[case(VmError::NotAligned(3.5), "Address is not aligned. Given: 3.5")]
    #[case(VmError::OutOfRange(-8.0), "Address out of range: -8")]
    #[case(VmError::WrongDictionaryHead(5.0), "Wrong DSP_START_ADDR: 5")]
    #[case(VmError::OutOfMemory, "Out of memory")]
    fn test_diagnostic_text(#[case] err: VmError, #[case] text: &str) {
        assert_eq!(err.to_string(), text);
    }
}

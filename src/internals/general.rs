// General-purpose builtin words: arithmetic, comparison, logic, stack
// shuffling, and raw memory access.

use crate::error::{Result, VmError};
use crate::kernel::{aligned, Kernel, CELL, FALSE, STATE_ADDR, TO_IN_ADDR, TRUE};
use crate::runtime::ForthRuntime;

fn flag(b: bool) -> f64 {
    if b {
        TRUE
    } else {
        FALSE
    }
}

/// Bitwise helpers work on the integer reading of a cell, which is exact for
/// every value the interpreter produces.
fn bits(a: f64) -> i64 {
    a as i64
}

impl ForthRuntime {
    /// Basic Forth operations on the stack.
    ///
    pub fn f_plus(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop2_push1(|j, k| j + k)
    }

    pub fn f_minus(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop2_push1(|j, k| j - k)
    }

    pub fn f_times(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop2_push1(|j, k| j * k)
    }

    pub fn f_divide(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop2_push1(|j, k| j / k)
    }

    pub fn f_mod(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop2_push1(|j, k| j % k)
    }

    pub fn f_negate(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop1_push1(|a| -a)
    }

    pub fn f_abs(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop1_push1(f64::abs)
    }

    pub fn f_min(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop2_push1(f64::min)
    }

    pub fn f_max(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop2_push1(f64::max)
    }

    pub fn f_one_plus(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop1_push1(|a| a + 1.0)
    }

    pub fn f_one_minus(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop1_push1(|a| a - 1.0)
    }

    pub fn f_two_times(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop1_push1(|a| a * 2.0)
    }

    pub fn f_two_divide(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop1_push1(|a| a / 2.0)
    }

    pub fn f_equal(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop2_push1(|j, k| flag(j == k))
    }

    pub fn f_not_equal(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop2_push1(|j, k| flag(j != k))
    }

    pub fn f_less(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop2_push1(|j, k| flag(j < k))
    }

    pub fn f_greater(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop2_push1(|j, k| flag(j > k))
    }

    pub fn f_0equal(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop1_push1(|a| flag(a == 0.0))
    }

    pub fn f_0less(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop1_push1(|a| flag(a < 0.0))
    }

    pub fn f_0greater(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop1_push1(|a| flag(a > 0.0))
    }

    pub fn f_true(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.push(TRUE)
    }

    pub fn f_false(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.push(FALSE)
    }

    pub fn f_and(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop2_push1(|j, k| (bits(j) & bits(k)) as f64)
    }

    pub fn f_or(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop2_push1(|j, k| (bits(j) | bits(k)) as f64)
    }

    pub fn f_xor(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop2_push1(|j, k| (bits(j) ^ bits(k)) as f64)
    }

    pub fn f_invert(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop1_push1(|a| !bits(a) as f64)
    }

    /// Stack shufflers.
    ///
    pub fn f_dup(&mut self, _pfa: usize) -> Result<()> {
        let top = self.kernel.pick(0)?;
        self.kernel.push(top)
    }

    pub fn f_q_dup(&mut self, _pfa: usize) -> Result<()> {
        let top = self.kernel.pick(0)?;
        if top != 0.0 {
            self.kernel.push(top)?;
        }
        Ok(())
    }

    pub fn f_drop(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop()?;
        Ok(())
    }

    pub fn f_swap(&mut self, _pfa: usize) -> Result<()> {
        let a = self.kernel.pop()?;
        let b = self.kernel.pop()?;
        self.kernel.push(a)?;
        self.kernel.push(b)
    }

    pub fn f_over(&mut self, _pfa: usize) -> Result<()> {
        let second = self.kernel.pick(1)?;
        self.kernel.push(second)
    }

    pub fn f_rot(&mut self, _pfa: usize) -> Result<()> {
        let third = self.kernel.pop()?;
        let second = self.kernel.pop()?;
        let first = self.kernel.pop()?;
        self.kernel.push(second)?;
        self.kernel.push(third)?;
        self.kernel.push(first)
    }

    pub fn f_minus_rot(&mut self, _pfa: usize) -> Result<()> {
        let third = self.kernel.pop()?;
        let second = self.kernel.pop()?;
        let first = self.kernel.pop()?;
        self.kernel.push(third)?;
        self.kernel.push(first)?;
        self.kernel.push(second)
    }

    pub fn f_nip(&mut self, _pfa: usize) -> Result<()> {
        let top = self.kernel.pop()?;
        self.kernel.pop()?;
        self.kernel.push(top)
    }

    pub fn f_tuck(&mut self, _pfa: usize) -> Result<()> {
        let top = self.kernel.pop()?;
        let under = self.kernel.pop()?;
        self.kernel.push(top)?;
        self.kernel.push(under)?;
        self.kernel.push(top)
    }

    pub fn f_pick(&mut self, _pfa: usize) -> Result<()> {
        let n = self.kernel.pop()?;
        if n < 0.0 || n.fract() != 0.0 {
            return Err(VmError::StackUnderflow);
        }
        let val = self.kernel.pick(n as usize)?;
        self.kernel.push(val)
    }

    pub fn f_depth(&mut self, _pfa: usize) -> Result<()> {
        let depth = self.kernel.depth();
        self.kernel.push(depth as f64)
    }

    pub fn f_two_dup(&mut self, _pfa: usize) -> Result<()> {
        let second = self.kernel.pick(1)?;
        let top = self.kernel.pick(0)?;
        self.kernel.push(second)?;
        self.kernel.push(top)
    }

    pub fn f_two_drop(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop()?;
        self.kernel.pop()?;
        Ok(())
    }

    /// >r ( n -- ) moves the top of the stack to the return stack
    ///
    pub fn f_to_r(&mut self, _pfa: usize) -> Result<()> {
        let val = self.kernel.pop()?;
        self.kernel.r_push(val)
    }

    /// r> ( -- n ) moves the top of the return stack back
    ///
    pub fn f_r_from(&mut self, _pfa: usize) -> Result<()> {
        let val = self.kernel.r_pop()?;
        self.kernel.push(val)
    }

    /// r@ ( -- n ) copies the top of the return stack
    ///
    pub fn f_r_get(&mut self, _pfa: usize) -> Result<()> {
        let val = self.kernel.r_pick(0)?;
        self.kernel.push(val)
    }

    /// @ ( a -- v ) fetches the cell at address a
    pub fn f_get(&mut self, _pfa: usize) -> Result<()> {
        let a = self.kernel.pop()?;
        let addr = Kernel::cell_addr(a)?;
        let val = self.kernel.fetch(addr)?;
        self.kernel.push(val)
    }

    /// ! ( v a -- ) stores v at address a
    ///
    pub fn f_store(&mut self, _pfa: usize) -> Result<()> {
        let a = self.kernel.pop()?;
        let val = self.kernel.pop()?;
        let addr = Kernel::cell_addr(a)?;
        self.kernel.store(addr, val)
    }

    /// +! ( v a -- ) adds v to the cell at address a
    pub fn f_plus_store(&mut self, _pfa: usize) -> Result<()> {
        let a = self.kernel.pop()?;
        let val = self.kernel.pop()?;
        let addr = Kernel::cell_addr(a)?;
        let old = self.kernel.fetch(addr)?;
        self.kernel.store(addr, old + val)
    }

    /// c@ ( a -- c ) fetches one character
    ///
    pub fn f_c_get(&mut self, _pfa: usize) -> Result<()> {
        let a = self.kernel.pop()?;
        let addr = Kernel::char_addr(a)?;
        let val = self.kernel.c_fetch(addr)?;
        self.kernel.push(val as f64)
    }

    /// c! ( c a -- ) stores one character
    pub fn f_c_store(&mut self, _pfa: usize) -> Result<()> {
        let a = self.kernel.pop()?;
        let val = self.kernel.pop()?;
        let addr = Kernel::char_addr(a)?;
        self.kernel.c_store(addr, val as i64 as u8)
    }

    /// , ( n -- ) appends a cell to the dictionary
    pub fn f_comma(&mut self, _pfa: usize) -> Result<()> {
        let val = self.kernel.pop()?;
        self.kernel.comma(val)
    }

    /// c, ( c -- ) appends one character to the dictionary
    pub fn f_c_comma(&mut self, _pfa: usize) -> Result<()> {
        let val = self.kernel.pop()?;
        self.kernel.c_comma(val as i64 as u8)
    }

    /// allot ( n -- ) reserves n bytes of dictionary space
    pub fn f_allot(&mut self, _pfa: usize) -> Result<()> {
        let n = self.kernel.pop()?;
        self.kernel.allot(n as i64)
    }

    /// align ( -- ) rounds HERE up to the next cell boundary
    pub fn f_align(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.align_here();
        Ok(())
    }

    /// aligned ( a -- a' ) rounds an address up to the next cell boundary
    pub fn f_aligned(&mut self, _pfa: usize) -> Result<()> {
        let a = self.kernel.pop()?;
        let addr = Kernel::char_addr(a)?;
        self.kernel.push(aligned(addr) as f64)
    }

    /// here ( -- a ) pushes the dictionary pointer
    pub fn f_here(&mut self, _pfa: usize) -> Result<()> {
        let here = self.kernel.here();
        self.kernel.push(here as f64)
    }

    pub fn f_cell_plus(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop1_push1(|a| a + CELL as f64)
    }

    pub fn f_cells(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop1_push1(|a| a * CELL as f64)
    }

    pub fn f_char_plus(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.pop1_push1(|a| a + 1.0)
    }

    /// count ( a -- a+1 u ) unpacks a counted string
    pub fn f_count(&mut self, _pfa: usize) -> Result<()> {
        let a = self.kernel.pop()?;
        let addr = Kernel::char_addr(a)?;
        let len = self.kernel.c_fetch(addr)?;
        self.kernel.push((addr + 1) as f64)?;
        self.kernel.push(len as f64)
    }

    /// state ( -- a ) pushes the address of the STATE cell
    pub fn f_state(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.push(STATE_ADDR as f64)
    }

    /// >in ( -- a ) pushes the address of the input cursor cell
    pub fn f_to_in(&mut self, _pfa: usize) -> Result<()> {
        self.kernel.push(TO_IN_ADDR as f64)
    }
}

//////////////////////////////////////////////
/// TESTS
///
#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn runtime() -> ForthRuntime {
        let mut rt = ForthRuntime::new();
        rt.cold_start();
        rt
    }

    fn run2(f: fn(&mut ForthRuntime, usize) -> Result<()>, a: f64, b: f64) -> f64 {
        let mut rt = runtime();
        rt.kernel.push(a).unwrap();
        rt.kernel.push(b).unwrap();
        f(&mut rt, 0).unwrap();
        rt.pop().unwrap()
    }

    #[rstest]
    #[case(ForthRuntime::f_plus as fn(&mut ForthRuntime, usize) -> Result<()>, 40.0, 2.0, 42.0)]
    #[case(ForthRuntime::f_minus, 50.0, 8.0, 42.0)]
    #[case(ForthRuntime::f_times, 6.0, 7.0, 42.0)]
    #[case(ForthRuntime::f_divide, 7.0, 2.0, 3.5)]
    #[case(ForthRuntime::f_mod, 7.0, 3.0, 1.0)]
    #[case(ForthRuntime::f_min, 3.0, -5.0, -5.0)]
    #[case(ForthRuntime::f_max, 3.0, -5.0, 3.0)]
    fn test_arithmetic(
        #[case] f: fn(&mut ForthRuntime, usize) -> Result<()>,
        #[case] a: f64,
        #[case] b: f64,
        #[case] expect: f64,
    ) {
        assert_eq!(run2(f, a, b), expect);
    }

    #[rstest]
    #[case(ForthRuntime::f_equal as fn(&mut ForthRuntime, usize) -> Result<()>, 2.0, 2.0, TRUE)]
    #[case(ForthRuntime::f_equal, 2.0, 3.0, FALSE)]
    #[case(ForthRuntime::f_not_equal, 2.0, 3.0, TRUE)]
    #[case(ForthRuntime::f_less, 2.0, 3.0, TRUE)]
    #[case(ForthRuntime::f_greater, 2.0, 3.0, FALSE)]
    fn test_comparison(
        #[case] f: fn(&mut ForthRuntime, usize) -> Result<()>,
        #[case] a: f64,
        #[case] b: f64,
        #[case] expect: f64,
    ) {
        assert_eq!(run2(f, a, b), expect);
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(run2(ForthRuntime::f_and, 6.0, 3.0), 2.0);
        assert_eq!(run2(ForthRuntime::f_or, 6.0, 3.0), 7.0);
        assert_eq!(run2(ForthRuntime::f_xor, 6.0, 3.0), 5.0);
        let mut rt = runtime();
        rt.kernel.push(0.0).unwrap();
        rt.f_invert(0).unwrap();
        assert_eq!(rt.pop().unwrap(), TRUE);
    }

    #[test]
    fn test_underflow_reported() {
        let mut rt = runtime();
        assert_eq!(rt.f_plus(0), Err(VmError::StackUnderflow));
        assert_eq!(rt.f_dup(0), Err(VmError::StackUnderflow));
    }

    #[test]
    fn test_stack_shufflers() {
        let mut rt = runtime();
        rt.kernel.push(1.0).unwrap();
        rt.kernel.push(2.0).unwrap();
        rt.f_tuck(0).unwrap(); // 2 1 2
        assert_eq!(rt.kernel.depth(), 3);
        assert_eq!(rt.pop().unwrap(), 2.0);
        assert_eq!(rt.pop().unwrap(), 1.0);
        assert_eq!(rt.pop().unwrap(), 2.0);

        rt.kernel.push(1.0).unwrap();
        rt.kernel.push(2.0).unwrap();
        rt.kernel.push(3.0).unwrap();
        rt.f_rot(0).unwrap(); // 2 3 1
        assert_eq!(rt.pop().unwrap(), 1.0);
        assert_eq!(rt.pop().unwrap(), 3.0);
        assert_eq!(rt.pop().unwrap(), 2.0);
    }

    #[test]
    fn test_pick_and_depth() {
        let mut rt = runtime();
        for v in [10.0, 20.0, 30.0] {
            rt.kernel.push(v).unwrap();
        }
        rt.kernel.push(2.0).unwrap();
        rt.f_pick(0).unwrap();
        assert_eq!(rt.pop().unwrap(), 10.0);
        rt.f_depth(0).unwrap();
        assert_eq!(rt.pop().unwrap(), 3.0);
    }

    #[test]
    fn test_q_dup() {
        let mut rt = runtime();
        rt.kernel.push(0.0).unwrap();
        rt.f_q_dup(0).unwrap();
        assert_eq!(rt.kernel.depth(), 1);
        rt.kernel.push(5.0).unwrap();
        rt.f_q_dup(0).unwrap();
        assert_eq!(rt.kernel.depth(), 3);
    }

    #[test]
    fn test_return_stack_words() {
        let mut rt = runtime();
        rt.kernel.push(9.0).unwrap();
        rt.f_to_r(0).unwrap();
        rt.f_r_get(0).unwrap();
        assert_eq!(rt.pop().unwrap(), 9.0);
        rt.f_r_from(0).unwrap();
        assert_eq!(rt.pop().unwrap(), 9.0);
    }

    #[test]
    fn test_fetch_store_round_trip() {
        let mut rt = runtime();
        let addr = rt.kernel.here() as f64;
        rt.kernel.push(0.0).unwrap();
        rt.f_comma(0).unwrap(); // reserve the cell
        rt.kernel.push(42.0).unwrap();
        rt.kernel.push(addr).unwrap();
        rt.f_store(0).unwrap();
        rt.kernel.push(addr).unwrap();
        rt.f_get(0).unwrap();
        assert_eq!(rt.pop().unwrap(), 42.0);
    }

    #[test]
    fn test_store_unaligned_address() {
        let mut rt = runtime();
        rt.kernel.push(1.0).unwrap();
        rt.kernel.push(43.0).unwrap();
        assert_eq!(rt.f_store(0), Err(VmError::NotAligned(43.0)));
    }

    #[test]
    fn test_plus_store() {
        let mut rt = runtime();
        let addr = rt.kernel.here() as f64;
        rt.kernel.push(40.0).unwrap();
        rt.f_comma(0).unwrap();
        rt.kernel.push(2.0).unwrap();
        rt.kernel.push(addr).unwrap();
        rt.f_plus_store(0).unwrap();
        assert_eq!(rt.kernel.fetch(addr as usize).unwrap(), 42.0);
    }

    #[test]
    fn test_allot_and_here_growth() {
        let mut rt = runtime();
        let start = rt.kernel.here();
        rt.kernel.push(5.0).unwrap();
        rt.f_allot(0).unwrap();
        rt.kernel.push(b'x' as f64).unwrap();
        rt.f_c_comma(0).unwrap();
        assert_eq!(rt.kernel.here(), start + 6);
        rt.f_align(0).unwrap();
        assert_eq!(rt.kernel.here(), start + 8);
    }

    #[test]
    fn test_count() {
        let mut rt = runtime();
        let pod = crate::kernel::POD_ADDR;
        rt.kernel.string_set(pod, "abc").unwrap();
        rt.kernel.push(pod as f64).unwrap();
        rt.f_count(0).unwrap();
        assert_eq!(rt.pop().unwrap(), 3.0);
        assert_eq!(rt.pop().unwrap(), (pod + 1) as f64);
    }
}

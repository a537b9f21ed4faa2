// ABOUTME: Tagged-width integer value with C's usual arithmetic conversions
// ABOUTME: (spec.md §4.3). Grounded on `integer.h`/`integer.cpp`.

use crate::diagnostic::{Diagnostic, WARN_SHIFT_OVERFLOW, WARN_SIGN_CHANGED, WARN_ZERO_DIVIDE};

/// The six arithmetic types the evaluator deals in, ranked exactly as
/// `enum integer_type` ranks them so that `max(lhs, rhs)` picks the wider
/// operand the same way the original's raw numeric comparison does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IntegerType {
    Int,
    UInt,
    Long,
    ULong,
    LLong,
    ULLong,
}

impl IntegerType {
    fn rank(self) -> u32 {
        match self {
            IntegerType::Int | IntegerType::UInt => 3,
            IntegerType::Long | IntegerType::ULong => 4,
            IntegerType::LLong | IntegerType::ULLong => 5,
        }
    }

    pub fn size(self) -> usize {
        match self {
            IntegerType::Int | IntegerType::UInt => 4,
            _ => 8,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            IntegerType::Int | IntegerType::Long | IntegerType::LLong
        )
    }

    fn to_unsigned(self) -> IntegerType {
        match self {
            IntegerType::Int | IntegerType::UInt => IntegerType::UInt,
            IntegerType::Long | IntegerType::ULong => IntegerType::ULong,
            IntegerType::LLong | IntegerType::ULLong => IntegerType::ULLong,
        }
    }

    pub fn desc(self) -> &'static str {
        match self {
            IntegerType::Int => "int",
            IntegerType::UInt => "unsigned int",
            IntegerType::Long => "long int",
            IntegerType::ULong => "unsigned long int",
            IntegerType::LLong => "long long int",
            IntegerType::ULLong => "unsigned long long int",
        }
    }
}

/// An integer value of one of the above types, or the undefined value that
/// partial evaluation yields whenever an operand depends on something
/// unresolvable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Integer {
    val: u64,
    ty: Option<IntegerType>,
}

/// Diagnostics raised incidentally while evaluating — sign changes, shift
/// overflow, division by zero — surfaced to the caller rather than emitted
/// directly, matching how `cursor::ScanDiagnostics` is threaded.
#[derive(Debug, Default)]
pub struct IntegerDiagnostics {
    pub pending: Vec<Diagnostic>,
}

impl Integer {
    pub fn new(ty: IntegerType, val: u64) -> Self {
        Integer { val, ty: Some(ty) }
    }

    pub fn undef() -> Self {
        Integer { val: 0, ty: None }
    }

    pub fn from_bool(b: bool) -> Self {
        Integer::new(IntegerType::Int, b as u64)
    }

    pub fn ty(&self) -> Option<IntegerType> {
        self.ty
    }

    pub fn good(&self) -> bool {
        self.ty.is_some()
    }

    pub fn raw(&self) -> u64 {
        self.val
    }

    pub fn is_signed(&self) -> bool {
        self.ty.map(|t| t.is_signed()).unwrap_or(false)
    }

    pub fn is_truthy(&self) -> bool {
        self.val != 0
    }

    /// -1 if signed and negative, 1 if signed and non-negative or unsigned,
    /// 0 if undefined.
    pub fn sign(&self) -> i32 {
        match self.ty {
            None => 0,
            Some(IntegerType::Int) => {
                if (self.val as u32 as i32) < 0 {
                    -1
                } else {
                    1
                }
            }
            Some(IntegerType::Long) | Some(IntegerType::LLong) => {
                if (self.val as i64) < 0 {
                    -1
                } else {
                    1
                }
            }
            Some(_) => 1,
        }
    }

    fn result_type(
        lhs: &Integer,
        rhs: &Integer,
        diags: &mut IntegerDiagnostics,
    ) -> Option<IntegerType> {
        let (lt, rt) = (lhs.ty?, rhs.ty?);
        let mut result = std::cmp::max(lt, rt);

        if result != lt {
            let mut r = result;
            if !lt.is_signed() && r.rank() == lt.rank() + 1 {
                r = r.to_unsigned();
            }
            let test = Integer::new(r, lhs.val);
            if test.sign() != lhs.sign() && lhs.sign() < 0 {
                diags.pending.push(Diagnostic::new(
                    WARN_SIGN_CHANGED,
                    format!(
                        "integer {} changed sign to {} by the usual arithmetic conversions",
                        lhs.val as i64, test.val as i64
                    ),
                ));
            }
            result = r;
        } else if result != rt {
            let mut r = result;
            if !rt.is_signed() && r.rank() == rt.rank() + 1 {
                r = r.to_unsigned();
            }
            let test = Integer::new(r, rhs.val);
            if test.sign() != rhs.sign() && rhs.sign() < 0 {
                diags.pending.push(Diagnostic::new(
                    WARN_SIGN_CHANGED,
                    format!(
                        "integer {} changed sign to {} by the usual arithmetic conversions",
                        rhs.val as i64, test.val as i64
                    ),
                ));
            }
            result = r;
        }
        Some(result)
    }

    fn cast_to(ty: IntegerType, val: u64) -> u64 {
        match ty {
            IntegerType::Int => (val as i32) as i64 as u64 & 0xFFFF_FFFF,
            IntegerType::UInt => (val as u32) as u64,
            IntegerType::Long | IntegerType::LLong => val,
            IntegerType::ULong | IntegerType::ULLong => val,
        }
    }

    fn binary_op(
        &self,
        rhs: &Integer,
        diags: &mut IntegerDiagnostics,
        f_signed: impl Fn(i64, i64) -> i64,
        f_unsigned: impl Fn(u64, u64) -> u64,
    ) -> Integer {
        let Some(ty) = Integer::result_type(self, rhs, diags) else {
            return Integer::undef();
        };
        let a = Integer::cast_to(ty, self.val);
        let b = Integer::cast_to(ty, rhs.val);
        let raw = if ty.is_signed() {
            f_signed(sign_extend(ty, a), sign_extend(ty, b)) as u64
        } else {
            f_unsigned(a, b)
        };
        Integer::new(ty, Integer::cast_to(ty, raw))
    }

    pub fn lt(&self, rhs: &Integer, d: &mut IntegerDiagnostics) -> Integer {
        self.compare(rhs, d, |a, b| a < b, |a, b| a < b)
    }
    pub fn le(&self, rhs: &Integer, d: &mut IntegerDiagnostics) -> Integer {
        self.compare(rhs, d, |a, b| a <= b, |a, b| a <= b)
    }
    pub fn gt(&self, rhs: &Integer, d: &mut IntegerDiagnostics) -> Integer {
        self.compare(rhs, d, |a, b| a > b, |a, b| a > b)
    }
    pub fn ge(&self, rhs: &Integer, d: &mut IntegerDiagnostics) -> Integer {
        self.compare(rhs, d, |a, b| a >= b, |a, b| a >= b)
    }
    pub fn eq(&self, rhs: &Integer, d: &mut IntegerDiagnostics) -> Integer {
        self.compare(rhs, d, |a, b| a == b, |a, b| a == b)
    }
    pub fn ne(&self, rhs: &Integer, d: &mut IntegerDiagnostics) -> Integer {
        self.compare(rhs, d, |a, b| a != b, |a, b| a != b)
    }

    fn compare(
        &self,
        rhs: &Integer,
        diags: &mut IntegerDiagnostics,
        f_signed: impl Fn(i64, i64) -> bool,
        f_unsigned: impl Fn(u64, u64) -> bool,
    ) -> Integer {
        let Some(ty) = Integer::result_type(self, rhs, diags) else {
            return Integer::undef();
        };
        let a = Integer::cast_to(ty, self.val);
        let b = Integer::cast_to(ty, rhs.val);
        let result = if ty.is_signed() {
            f_signed(sign_extend(ty, a), sign_extend(ty, b))
        } else {
            f_unsigned(a, b)
        };
        Integer::from_bool(result)
    }

    pub fn logical_and(&self, rhs: &Integer, d: &mut IntegerDiagnostics) -> Integer {
        if Integer::result_type(self, rhs, d).is_none() {
            return Integer::undef();
        }
        Integer::from_bool(self.is_truthy() && rhs.is_truthy())
    }

    pub fn logical_or(&self, rhs: &Integer, d: &mut IntegerDiagnostics) -> Integer {
        if Integer::result_type(self, rhs, d).is_none() {
            return Integer::undef();
        }
        Integer::from_bool(self.is_truthy() || rhs.is_truthy())
    }

    pub fn bitand(&self, rhs: &Integer, d: &mut IntegerDiagnostics) -> Integer {
        self.binary_op(rhs, d, |a, b| a & b, |a, b| a & b)
    }
    pub fn bitor(&self, rhs: &Integer, d: &mut IntegerDiagnostics) -> Integer {
        self.binary_op(rhs, d, |a, b| a | b, |a, b| a | b)
    }
    pub fn bitxor(&self, rhs: &Integer, d: &mut IntegerDiagnostics) -> Integer {
        self.binary_op(rhs, d, |a, b| a ^ b, |a, b| a ^ b)
    }
    pub fn add(&self, rhs: &Integer, d: &mut IntegerDiagnostics) -> Integer {
        self.binary_op(rhs, d, |a, b| a.wrapping_add(b), |a, b| a.wrapping_add(b))
    }
    pub fn sub(&self, rhs: &Integer, d: &mut IntegerDiagnostics) -> Integer {
        self.binary_op(rhs, d, |a, b| a.wrapping_sub(b), |a, b| a.wrapping_sub(b))
    }
    pub fn mul(&self, rhs: &Integer, d: &mut IntegerDiagnostics) -> Integer {
        self.binary_op(rhs, d, |a, b| a.wrapping_mul(b), |a, b| a.wrapping_mul(b))
    }

    pub fn div(&self, rhs: &Integer, diags: &mut IntegerDiagnostics) -> Integer {
        let Some(ty) = Integer::result_type(self, rhs, diags) else {
            return Integer::undef();
        };
        if rhs.val == 0 {
            diags.pending.push(Diagnostic::new(
                WARN_ZERO_DIVIDE,
                "division by zero; expression left unresolved",
            ));
            return Integer::undef();
        }
        let a = Integer::cast_to(ty, self.val);
        let b = Integer::cast_to(ty, rhs.val);
        let raw = if ty.is_signed() {
            sign_extend(ty, a).wrapping_div(sign_extend(ty, b)) as u64
        } else {
            a.wrapping_div(b)
        };
        Integer::new(ty, Integer::cast_to(ty, raw))
    }

    pub fn rem(&self, rhs: &Integer, diags: &mut IntegerDiagnostics) -> Integer {
        let Some(ty) = Integer::result_type(self, rhs, diags) else {
            return Integer::undef();
        };
        if rhs.val == 0 {
            diags.pending.push(Diagnostic::new(
                WARN_ZERO_DIVIDE,
                "modulus by zero; expression left unresolved",
            ));
            return Integer::undef();
        }
        let a = Integer::cast_to(ty, self.val);
        let b = Integer::cast_to(ty, rhs.val);
        let raw = if ty.is_signed() {
            sign_extend(ty, a).wrapping_rem(sign_extend(ty, b)) as u64
        } else {
            a.wrapping_rem(b)
        };
        Integer::new(ty, Integer::cast_to(ty, raw))
    }

    fn valid_shift(direction: i32, lhs: &Integer, rhs: &Integer, diags: &mut IntegerDiagnostics) -> bool {
        let Some(lt) = lhs.ty else { return false };
        let type_bits = (lt.size() * 8) as u32;
        let val = rhs.raw();
        let mut ok = true;
        if rhs.is_signed() {
            let neg_bit = 1u64 << (type_bits - 1);
            if val & neg_bit != 0 {
                let way = if direction < 0 { "left" } else { "right" };
                diags.pending.push(Diagnostic::new(
                    WARN_SHIFT_OVERFLOW,
                    format!("negative {way}-shift has undefined behavior; expression left unresolved"),
                ));
                ok = false;
            }
        }
        if ok && val >= type_bits as u64 {
            diags.pending.push(Diagnostic::new(
                WARN_SHIFT_OVERFLOW,
                format!(
                    "shifting {} {} by {} bits has undefined behavior",
                    lt.desc(),
                    lhs.raw(),
                    type_bits
                ),
            ));
        }
        ok
    }

    pub fn shl(&self, rhs: &Integer, diags: &mut IntegerDiagnostics) -> Integer {
        if Integer::result_type(self, rhs, diags).is_none()
            || !Integer::valid_shift(-1, self, rhs, diags)
        {
            return Integer::undef();
        }
        let ty = self.ty.unwrap();
        let shift = (rhs.val as u32) % (ty.size() as u32 * 8);
        Integer::new(ty, Integer::cast_to(ty, self.val.wrapping_shl(shift)))
    }

    pub fn shr(&self, rhs: &Integer, diags: &mut IntegerDiagnostics) -> Integer {
        if Integer::result_type(self, rhs, diags).is_none()
            || !Integer::valid_shift(1, self, rhs, diags)
        {
            return Integer::undef();
        }
        let ty = self.ty.unwrap();
        let shift = (rhs.val as u32) % (ty.size() as u32 * 8);
        let raw = if ty.is_signed() {
            (sign_extend(ty, self.val) >> shift) as u64
        } else {
            self.val.wrapping_shr(shift)
        };
        Integer::new(ty, Integer::cast_to(ty, raw))
    }

    pub fn not(&self) -> Integer {
        if !self.good() {
            return Integer::undef();
        }
        Integer::from_bool(self.val == 0)
    }

    pub fn bitnot(&self) -> Integer {
        match self.ty {
            None => Integer::undef(),
            Some(ty) => Integer::new(ty, Integer::cast_to(ty, !self.val)),
        }
    }

    pub fn neg(&self) -> Integer {
        match self.ty {
            None => Integer::undef(),
            Some(ty) => {
                let raw = if ty.is_signed() {
                    (-sign_extend(ty, self.val)) as u64
                } else {
                    self.val.wrapping_neg()
                };
                Integer::new(ty, Integer::cast_to(ty, raw))
            }
        }
    }

    pub fn pos(&self) -> Integer {
        *self
    }
}

fn sign_extend(ty: IntegerType, val: u64) -> i64 {
    if ty.size() == 4 {
        val as u32 as i32 as i64
    } else {
        val as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addition_within_int_stays_int() {
        let mut d = IntegerDiagnostics::default();
        let a = Integer::new(IntegerType::Int, 2);
        let b = Integer::new(IntegerType::Int, 3);
        let r = a.add(&b, &mut d);
        assert_eq!(r.ty(), Some(IntegerType::Int));
        assert_eq!(r.raw() as i64, 5);
        assert!(d.pending.is_empty());
    }

    #[test]
    fn mixed_rank_promotes_to_wider_type() {
        let mut d = IntegerDiagnostics::default();
        let a = Integer::new(IntegerType::Int, 1);
        let b = Integer::new(IntegerType::LLong, 2);
        let r = a.add(&b, &mut d);
        assert_eq!(r.ty(), Some(IntegerType::LLong));
    }

    #[test]
    fn division_by_zero_is_undef_with_warning() {
        let mut d = IntegerDiagnostics::default();
        let a = Integer::new(IntegerType::Int, 10);
        let z = Integer::new(IntegerType::Int, 0);
        let r = a.div(&z, &mut d);
        assert!(!r.good());
        assert_eq!(d.pending.len(), 1);
    }

    #[test]
    fn undef_propagates_through_arithmetic() {
        let mut d = IntegerDiagnostics::default();
        let a = Integer::undef();
        let b = Integer::new(IntegerType::Int, 1);
        assert!(!a.add(&b, &mut d).good());
    }

    #[test]
    fn negative_signed_shift_is_rejected() {
        let mut d = IntegerDiagnostics::default();
        let a = Integer::new(IntegerType::Int, 1);
        let neg_one = Integer::new(IntegerType::Int, u32::MAX as u64);
        let r = a.shl(&neg_one, &mut d);
        assert!(!r.good());
        assert_eq!(d.pending.len(), 1);
    }

    #[test]
    fn comparison_yields_int_bool() {
        let mut d = IntegerDiagnostics::default();
        let a = Integer::new(IntegerType::Int, 1);
        let b = Integer::new(IntegerType::Int, 2);
        let r = a.lt(&b, &mut d);
        assert_eq!(r.ty(), Some(IntegerType::Int));
        assert_eq!(r.raw(), 1);
    }

    #[test]
    fn sign_of_negative_int_is_negative_one() {
        let neg = Integer::new(IntegerType::Int, (-5i32) as u32 as u64);
        assert_eq!(neg.sign(), -1);
    }

    #[test]
    fn unsigned_is_never_negative_signed() {
        let u = Integer::new(IntegerType::UInt, u32::MAX as u64);
        assert_eq!(u.sign(), 1);
    }
}

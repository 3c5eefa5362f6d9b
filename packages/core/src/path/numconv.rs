//! Base-N Numeral Codec
//!
//! Converts step positions to and from strings over a configurable alphabet.
//! The character at index 0 is the zero digit and the last character is the
//! largest digit, so equal-length encodings compare lexicographically in the
//! same order as the integers they encode. Padding to `steplen` is done by
//! [`PathLayout`](super::PathLayout), not here.

use super::PathError;

/// Converts non-negative integers to and from an arbitrary ordered alphabet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumConv {
    digits: Vec<char>,
}

impl NumConv {
    /// Create a codec for `alphabet`
    ///
    /// The alphabet must hold at least two distinct ASCII characters in
    /// strictly ascending byte order. Anything else would make string order
    /// disagree with numeric order.
    pub fn new(alphabet: &str) -> Result<Self, PathError> {
        let digits: Vec<char> = alphabet.chars().collect();

        if digits.len() < 2 {
            return Err(PathError::invalid_alphabet(
                alphabet,
                "needs at least two characters",
            ));
        }
        if !alphabet.is_ascii() {
            return Err(PathError::invalid_alphabet(alphabet, "must be ASCII"));
        }
        if digits.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(PathError::invalid_alphabet(
                alphabet,
                "characters must be unique and in ascending order",
            ));
        }

        Ok(Self { digits })
    }

    /// Number of symbols in the alphabet
    pub fn radix(&self) -> u64 {
        self.digits.len() as u64
    }

    /// The zero digit
    pub fn min_digit(&self) -> char {
        self.digits[0]
    }

    /// The largest digit
    pub fn max_digit(&self) -> char {
        self.digits[self.digits.len() - 1]
    }

    /// Whether `c` belongs to the alphabet
    pub fn contains(&self, c: char) -> bool {
        self.digit_value(c).is_some()
    }

    fn digit_value(&self, c: char) -> Option<u64> {
        // Digits are sorted, so a binary search finds the magnitude directly.
        self.digits.binary_search(&c).ok().map(|idx| idx as u64)
    }

    /// Encode `n` with the minimal number of digits
    pub fn int_to_str(&self, mut n: u64) -> String {
        let radix = self.radix();
        if n == 0 {
            return self.min_digit().to_string();
        }

        let mut out = Vec::new();
        while n > 0 {
            out.push(self.digits[(n % radix) as usize]);
            n /= radix;
        }
        out.iter().rev().collect()
    }

    /// Decode `s`, failing on the first character outside the alphabet
    pub fn str_to_int(&self, s: &str) -> Result<u64, PathError> {
        let radix = self.radix();
        let mut value: u64 = 0;

        for c in s.chars() {
            let digit = self
                .digit_value(c)
                .ok_or_else(|| PathError::InvalidDigit {
                    digit: c,
                    input: s.to_string(),
                })?;
            value = value
                .checked_mul(radix)
                .and_then(|v| v.checked_add(digit))
                .ok_or_else(|| PathError::PathOverflow {
                    path: s.to_string(),
                })?;
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BASE36: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    #[test]
    fn test_encodes_minimal_representation() {
        let conv = NumConv::new("0123456789").unwrap();
        assert_eq!(conv.int_to_str(0), "0");
        assert_eq!(conv.int_to_str(7), "7");
        assert_eq!(conv.int_to_str(42), "42");

        let base36 = NumConv::new(BASE36).unwrap();
        assert_eq!(base36.int_to_str(35), "Z");
        assert_eq!(base36.int_to_str(36), "10");
    }

    #[test]
    fn test_binary_alphabet() {
        let conv = NumConv::new("01").unwrap();
        assert_eq!(conv.int_to_str(5), "101");
        assert_eq!(conv.str_to_int("101").unwrap(), 5);
    }

    #[test]
    fn test_decodes_leading_zero_digits() {
        let conv = NumConv::new(BASE36).unwrap();
        assert_eq!(conv.str_to_int("0001").unwrap(), 1);
        assert_eq!(conv.str_to_int("00A0").unwrap(), 360);
    }

    #[test]
    fn test_invalid_digit_is_rejected() {
        let conv = NumConv::new("0123456789").unwrap();
        let err = conv.str_to_int("12a").unwrap_err();
        assert!(matches!(err, PathError::InvalidDigit { digit: 'a', .. }));
    }

    #[test]
    fn test_rejects_bad_alphabets() {
        assert!(NumConv::new("").is_err());
        assert!(NumConv::new("0").is_err());
        assert!(NumConv::new("0012").is_err());
        assert!(NumConv::new("ba").is_err());
        assert!(NumConv::new("0é").is_err());
    }

    #[test]
    fn test_digit_bounds() {
        let conv = NumConv::new(BASE36).unwrap();
        assert_eq!(conv.min_digit(), '0');
        assert_eq!(conv.max_digit(), 'Z');
        assert_eq!(conv.radix(), 36);
        assert!(conv.contains('K'));
        assert!(!conv.contains('k'));
    }

    proptest! {
        #[test]
        fn prop_round_trip(n in 0u64..(36u64.pow(4))) {
            let conv = NumConv::new(BASE36).unwrap();
            prop_assert_eq!(conv.str_to_int(&conv.int_to_str(n)).unwrap(), n);
        }

        #[test]
        fn prop_padded_order_matches_numeric_order(a in 0u64..1296, b in 0u64..1296) {
            let conv = NumConv::new(BASE36).unwrap();
            let pad = |n: u64| format!("{:0>2}", conv.int_to_str(n));
            prop_assert_eq!(a.cmp(&b), pad(a).cmp(&pad(b)));
        }
    }
}

// Copyright 2019 Zhizhesihai (Beijing) Technology Limited.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

pub mod fst;

/// Logical (zero filling) right shift, the `>>>` of the file format docs.
pub trait UnsignedShift {
    fn unsigned_shift(self, by: usize) -> Self;
}

impl UnsignedShift for i32 {
    #[inline]
    fn unsigned_shift(self, by: usize) -> Self {
        ((self as u32) >> by) as i32
    }
}

impl UnsignedShift for i64 {
    #[inline]
    fn unsigned_shift(self, by: usize) -> Self {
        ((self as u64) >> by) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_shift() {
        assert_eq!((-1i32).unsigned_shift(28), 0xf);
        assert_eq!((-1i64).unsigned_shift(62), 3);
        assert_eq!(6i64.unsigned_shift(1), 3);
    }
}

// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::error::{Error, Result};

pub mod arithmetic;
pub mod huffman;

/// Number of table destinations per class.
pub const NUM_TABLE_DESTINATIONS: usize = 4;

/// The `Tc` field of DHT and DAC segments.
#[derive(Debug, FromPrimitive, Clone, Copy, PartialEq, Eq)]
pub enum TableClass {
    Dc = 0,
    Ac = 1,
}

impl TryFrom<u8> for TableClass {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::from_u8(value).ok_or(Error::InvalidTableClass(value))
    }
}

pub(crate) fn check_destination(destination: u8) -> Result<usize> {
    if (destination as usize) < NUM_TABLE_DESTINATIONS {
        Ok(destination as usize)
    } else {
        Err(Error::InvalidTableDestination(destination))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn table_class_from_byte() {
        assert_eq!(TableClass::try_from(0).unwrap(), TableClass::Dc);
        assert_eq!(TableClass::try_from(1).unwrap(), TableClass::Ac);
        assert!(matches!(
            TableClass::try_from(2),
            Err(Error::InvalidTableClass(2))
        ));
        assert!(check_destination(3).is_ok());
        assert!(check_destination(4).is_err());
    }
}

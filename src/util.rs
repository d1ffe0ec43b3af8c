//! Module implement common utility functions.

use cbordata::{Cbor, FromCbor, IntoCbor};
use chrono::{DateTime, NaiveDateTime, Utc};

use std::convert::TryFrom;

use crate::{Error, Result};

/// Helper function to serialize value `T` implementing IntoCbor, into
/// byte-string.
pub fn into_cbor_bytes<T>(val: T) -> Result<Vec<u8>>
where
    T: IntoCbor,
{
    let mut data: Vec<u8> = vec![];
    let n = err_at!(
        FailCbor,
        err_at!(FailCbor, val.into_cbor())?.encode(&mut data)
    )?;
    if n != data.len() {
        err_at!(Fatal, msg: "cbor encoding len mistmatch {} {}", n, data.len())?;
    }

    Ok(data)
}

/// Inverse of [into_cbor_bytes], return the value and number of bytes
/// consumed from `data`.
pub fn from_cbor_bytes<T>(mut data: &[u8]) -> Result<(T, usize)>
where
    T: FromCbor,
{
    let (val, n) = err_at!(FailCbor, Cbor::decode(&mut data))?;
    Ok((err_at!(FailCbor, T::from_cbor(val))?, n))
}

/// Format `utc` as generalized-time string, `YYYYmmddHHMMSS.0Z`.
pub fn to_generalized_time(utc: DateTime<Utc>) -> String {
    format!("{}.0Z", utc.format("%Y%m%d%H%M%S"))
}

/// Parse a generalized-time string back into seconds since UNIX epoch.
/// Fractional seconds and the trailing `Z` are ignored.
pub fn parse_generalized_time(s: &str) -> Result<u64> {
    let prefix = match s.get(..14) {
        Some(prefix) => prefix,
        None => err_at!(InvalidInput, msg: "short generalized-time {:?}", s)?,
    };
    let dt = err_at!(
        InvalidInput,
        NaiveDateTime::parse_from_str(prefix, "%Y%m%d%H%M%S")
    )?;
    err_at!(InvalidInput, u64::try_from(dt.timestamp()))
}

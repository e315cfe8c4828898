//! Consensus-critical serialization.
//!
//! This module contains two traits: `ThunderboltSerialize` and
//! `ThunderboltDeserialize`, analogs of the Serde `Serialize` and
//! `Deserialize` traits but intended for the fixed, consensus-critical
//! Thunderbolt wire and disk formats.
//!
//! All integers are little-endian. Variable-length containers carry a
//! u32 count prefix. The one big-endian exception (the compact
//! difficulty field) lives with its type in [`crate::work::difficulty`].

mod deserialize;
mod error;

pub mod sha256d;

use chrono::{DateTime, Utc};
pub use deserialize::{ThunderboltDeserialize, ThunderboltDeserializeInto};
pub use error::SerializationError;

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use std::net::IpAddr;

pub trait ThunderboltSerialize {
    fn thunderbolt_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error>;

    fn thunderbolt_serialize_to_vec(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut data = Vec::new();
        self.thunderbolt_serialize(&mut data)?;
        Ok(data)
    }
}

impl ThunderboltSerialize for bool {
    fn thunderbolt_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&[*self as u8])
    }
}

impl ThunderboltSerialize for u8 {
    fn thunderbolt_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&[*self])
    }
}

impl ThunderboltSerialize for u16 {
    fn thunderbolt_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u16::<LittleEndian>(*self)
    }
}

impl ThunderboltSerialize for u32 {
    fn thunderbolt_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u32::<LittleEndian>(*self)
    }
}

impl ThunderboltSerialize for u64 {
    fn thunderbolt_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u64::<LittleEndian>(*self)
    }
}

impl ThunderboltSerialize for i32 {
    fn thunderbolt_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i32::<LittleEndian>(*self)
    }
}

impl ThunderboltSerialize for i64 {
    fn thunderbolt_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i64::<LittleEndian>(*self)
    }
}

impl ThunderboltSerialize for DateTime<Utc> {
    fn thunderbolt_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        // Wire timestamps are unsigned seconds; pre-epoch times clamp to 0.
        let secs = self.timestamp().max(0) as u64;
        target.write_u64::<LittleEndian>(secs)
    }
}

impl ThunderboltSerialize for std::net::Ipv6Addr {
    fn thunderbolt_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&self.octets())
    }
}

impl ThunderboltSerialize for std::net::IpAddr {
    fn thunderbolt_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        match self {
            IpAddr::V4(addr) => addr.to_ipv6_mapped().thunderbolt_serialize(&mut target),
            IpAddr::V6(addr) => addr.thunderbolt_serialize(&mut target),
        }
    }
}

impl ThunderboltSerialize for std::net::SocketAddr {
    fn thunderbolt_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        self.ip().thunderbolt_serialize(&mut target)?;
        target.write_u16::<BigEndian>(self.port())
    }
}

macro_rules! impl_serializable_byte_array {
    ($size:expr) => {
        impl ThunderboltSerialize for [u8; $size] {
            fn thunderbolt_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
            where
                W: std::io::Write,
            {
                target.write_all(self)
            }
        }
    };
}

impl_serializable_byte_array!(4);
impl_serializable_byte_array!(12);
impl_serializable_byte_array!(16);
impl_serializable_byte_array!(20);
impl_serializable_byte_array!(32);
impl_serializable_byte_array!(33);
impl_serializable_byte_array!(64);

impl<T> ThunderboltSerialize for Vec<T>
where
    T: ThunderboltSerialize,
{
    fn thunderbolt_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u32::<LittleEndian>(self.len() as u32)?;
        for item in self.iter() {
            item.thunderbolt_serialize(&mut target)?
        }
        Ok(())
    }
}

impl<T, U> ThunderboltSerialize for (T, U)
where
    T: ThunderboltSerialize,
    U: ThunderboltSerialize,
{
    fn thunderbolt_serialize<W>(&self, mut target: W) -> std::result::Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        self.0.thunderbolt_serialize(&mut target)?;
        self.1.thunderbolt_serialize(&mut target)?;
        Ok(())
    }
}

impl ThunderboltSerialize for String {
    fn thunderbolt_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u32::<LittleEndian>(self.len() as u32)?;
        target.write_all(self.as_bytes())?;
        Ok(())
    }
}

impl<T> ThunderboltSerialize for std::sync::Arc<T>
where
    T: ThunderboltSerialize,
{
    fn thunderbolt_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        T::thunderbolt_serialize(self, target)
    }
}

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use chrono::{DateTime, TimeZone, Utc};
use std::net::{Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::{
    io,
    net::IpAddr::{V4, V6},
};

use super::SerializationError;

type Result<R> = std::result::Result<R, SerializationError>;

pub trait ThunderboltDeserialize {
    fn thunderbolt_deserialize<R: io::Read>(reader: R) -> Result<Self>
    where
        Self: Sized;
}

/// Helper for deserializing more succinctly via type inference
pub trait ThunderboltDeserializeInto {
    /// Deserialize based on type inference
    fn thunderbolt_deserialize_into<T>(self) -> Result<T>
    where
        T: ThunderboltDeserialize;
}

impl<R: io::Read> ThunderboltDeserializeInto for R {
    fn thunderbolt_deserialize_into<T>(self) -> Result<T>
    where
        T: ThunderboltDeserialize,
    {
        T::thunderbolt_deserialize(self)
    }
}

impl ThunderboltDeserialize for bool {
    fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<bool> {
        let value = reader.read_u8()?;
        match value {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(SerializationError::Parse("Invalid bool")),
        }
    }
}

impl ThunderboltDeserialize for u8 {
    fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<u8> {
        Ok(reader.read_u8()?)
    }
}

impl ThunderboltDeserialize for u16 {
    fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<u16> {
        Ok(reader.read_u16::<LittleEndian>()?)
    }
}

impl ThunderboltDeserialize for u32 {
    fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<u32> {
        Ok(reader.read_u32::<LittleEndian>()?)
    }
}

impl ThunderboltDeserialize for u64 {
    fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<u64> {
        Ok(reader.read_u64::<LittleEndian>()?)
    }
}

impl ThunderboltDeserialize for i32 {
    fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<i32> {
        Ok(reader.read_i32::<LittleEndian>()?)
    }
}

impl ThunderboltDeserialize for i64 {
    fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<i64> {
        Ok(reader.read_i64::<LittleEndian>()?)
    }
}

impl ThunderboltDeserialize for DateTime<Utc> {
    fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<DateTime<Utc>> {
        let secs = reader.read_u64::<LittleEndian>()?;
        if secs > i64::MAX as u64 {
            return Err(SerializationError::Parse("timestamp out of range"));
        }
        Ok(Utc.timestamp(secs as i64, 0))
    }
}

impl<T> ThunderboltDeserialize for Vec<T>
where
    T: ThunderboltDeserialize,
{
    fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<Vec<T>> {
        let len = u32::thunderbolt_deserialize(&mut reader)? as usize;
        // Limit preallocation since blind preallocation is a DOS vulnerability
        let blind_alloc_limit = 1024;
        let mut result: Vec<T> = Vec::with_capacity(std::cmp::min(len, blind_alloc_limit));
        for _ in 0..len {
            result.push(T::thunderbolt_deserialize(&mut reader)?);
        }
        Ok(result)
    }
}

impl ThunderboltDeserialize for String {
    fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<String> {
        let buf = Vec::<u8>::thunderbolt_deserialize(&mut reader)?;
        String::from_utf8(buf).map_err(|_| SerializationError::Parse("invalid utf-8"))
    }
}

impl ThunderboltDeserialize for SocketAddr {
    fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<SocketAddr> {
        let octets = <[u8; 16]>::thunderbolt_deserialize(&mut reader)?;
        let v6_addr = Ipv6Addr::from(octets);

        let addr = match v6_addr.to_ipv4() {
            Some(v4_addr) => V4(v4_addr),
            None => V6(v6_addr),
        };
        Ok(SocketAddr::from((addr, reader.read_u16::<BigEndian>()?)))
    }
}

impl<T, U> ThunderboltDeserialize for (T, U)
where
    T: ThunderboltDeserialize,
    U: ThunderboltDeserialize,
{
    fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<(T, U)> {
        Ok((
            T::thunderbolt_deserialize(&mut reader)?,
            U::thunderbolt_deserialize(&mut reader)?,
        ))
    }
}

impl<T> ThunderboltDeserialize for Arc<T>
where
    T: ThunderboltDeserialize,
{
    fn thunderbolt_deserialize<R: io::Read>(reader: R) -> Result<Arc<T>> {
        Ok(Arc::new(T::thunderbolt_deserialize(reader)?))
    }
}

macro_rules! impl_deserializable_byte_array {
    ($size:expr) => {
        impl ThunderboltDeserialize for [u8; $size] {
            fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<[u8; $size]> {
                let mut result = [0u8; $size];
                reader.read_exact(&mut result)?;
                Ok(result)
            }
        }
    };
}

impl_deserializable_byte_array!(4);
impl_deserializable_byte_array!(12);
impl_deserializable_byte_array!(16);
impl_deserializable_byte_array!(20);
impl_deserializable_byte_array!(32);
impl_deserializable_byte_array!(33);
impl_deserializable_byte_array!(64);

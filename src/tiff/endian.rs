use eio::{FromBytes, ReadExt, ToBytes};
use num_traits::{NumCast, ToPrimitive};
use std::io::{self, Read};

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    pub fn read<const N: usize, T: FromBytes<N>>(&self, stream: &mut impl Read) -> io::Result<T> {
        let mut buf = [0u8; N];
        stream.read_exact(&mut buf)?;
        self.decode(buf)
    }

    pub fn decode<const N: usize, T: FromBytes<N>>(&self, bytes: [u8; N]) -> io::Result<T> {
        match self {
            Endian::Big => bytes.as_slice().read_be(),
            Endian::Little => bytes.as_slice().read_le(),
        }
    }

    /// Decodes a packed array of `A` and casts every element to `T`.
    /// Returns `None` on a trailing partial element or a lossy cast.
    pub fn decode_all_as<const N: usize, A, T>(&self, bytes: &[u8]) -> Option<Vec<T>>
    where
        A: FromBytes<N> + ToPrimitive,
        T: NumCast,
    {
        if bytes.len() % N != 0 {
            return None;
        }
        bytes
            .chunks_exact(N)
            .map(|chunk| {
                let arr: [u8; N] = chunk.try_into().ok()?;
                let value: A = self.decode(arr).ok()?;
                T::from(value)
            })
            .collect()
    }

    pub fn encode<const N: usize, T: ToBytes<N>>(&self, value: T) -> [u8; N] {
        match self {
            Endian::Big => value.to_be_bytes(),
            Endian::Little => value.to_le_bytes(),
        }
    }

    pub fn encode_all<const N: usize, T: ToBytes<N> + Copy>(&self, values: &[T]) -> Vec<u8> {
        values.iter().flat_map(|v| self.encode(*v)).collect()
    }

    pub fn magic(&self) -> &'static [u8; 2] {
        match self {
            Endian::Big => b"MM",
            Endian::Little => b"II",
        }
    }
}

//! The [`Wire`] trait and its implementations for primitives, text and
//! lists.

use std::fmt;
use std::marker::PhantomData;

use crate::error::{CodecError, Result};
use crate::stream::{MeasureStream, ReadStream, StreamMode, WriteStream};

/// A type with a single-buffer binary encoding.
///
/// The three passes must visit fields in the same order: `measure` adds
/// exactly the bytes `write` produces and `read` consumes.
pub trait Wire: Sized {
    /// Bytes this type occupies in its parent's fixed region.
    const FIXED_SIZE: usize;

    /// True when the encoding has no variable part, so list elements can be
    /// addressed by index.
    const FIXED_ONLY: bool = false;

    /// Decoded form, borrowing text and list records from the receive
    /// buffer.
    type View<'a>;

    /// Add this value's full encoded size, fixed and variable, to `stream`.
    fn measure(&self, stream: &mut MeasureStream);

    fn write(&self, stream: &mut WriteStream) -> Result<()>;

    fn read<'a>(stream: &mut ReadStream<'a>) -> Result<Self::View<'a>>;

    /// Copy a decoded view into an owned value.
    fn to_owned_value(view: &Self::View<'_>) -> Self;
}

macro_rules! wire_number {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Wire for $ty {
                const FIXED_SIZE: usize = std::mem::size_of::<$ty>();
                const FIXED_ONLY: bool = true;
                type View<'a> = $ty;

                fn measure(&self, stream: &mut MeasureStream) {
                    stream.add(Self::FIXED_SIZE);
                }

                fn write(&self, stream: &mut WriteStream) -> Result<()> {
                    stream.put_fixed(&self.to_le_bytes())
                }

                fn read<'a>(stream: &mut ReadStream<'a>) -> Result<$ty> {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(stream.take_fixed(Self::FIXED_SIZE)?);
                    Ok(<$ty>::from_le_bytes(raw))
                }

                fn to_owned_value(view: &$ty) -> Self {
                    *view
                }
            }
        )*
    };
}

wire_number!(u8, u16, u32, u64, i32, i64, f32, f64);

/// Text is a `u32` byte length in the fixed part and UTF-8 bytes, without
/// a terminator, in the variable part.
impl Wire for String {
    const FIXED_SIZE: usize = 4;
    type View<'a> = &'a str;

    fn measure(&self, stream: &mut MeasureStream) {
        stream.add(Self::FIXED_SIZE + self.len());
    }

    fn write(&self, stream: &mut WriteStream) -> Result<()> {
        let len = length_field(self.len())?;
        stream.put_fixed(&len.to_le_bytes())?;
        stream.put_var(self.as_bytes())
    }

    fn read<'a>(stream: &mut ReadStream<'a>) -> Result<&'a str> {
        let len = u32::read(stream)? as usize;
        let offset = stream.reserve_var(0)?;
        let raw = stream.take_var(len)?;
        std::str::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8 { offset })
    }

    fn to_owned_value(view: &&str) -> Self {
        (*view).to_owned()
    }
}

/// A list is a `u32` count in the fixed part. The variable part holds the
/// elements' fixed records back to back, followed by each element's own
/// variable content in order.
impl<T: Wire> Wire for Vec<T> {
    const FIXED_SIZE: usize = 4;
    type View<'a> = ListView<'a, T>;

    fn measure(&self, stream: &mut MeasureStream) {
        stream.add(Self::FIXED_SIZE);
        for item in self {
            item.measure(stream);
        }
    }

    fn write(&self, stream: &mut WriteStream) -> Result<()> {
        let count = length_field(self.len())?;
        stream.put_fixed(&count.to_le_bytes())?;

        let records = self.len() * T::FIXED_SIZE;
        let start = stream.reserve_var(records)?;
        let saved = stream.enter(start);
        for item in self {
            item.write(stream)?;
        }
        stream.leave(saved, start + records)
    }

    fn read<'a>(stream: &mut ReadStream<'a>) -> Result<ListView<'a, T>> {
        let count = u32::read(stream)? as usize;

        let records = count
            .checked_mul(T::FIXED_SIZE)
            .ok_or(CodecError::Truncated {
                mode: StreamMode::Read,
                offset: stream.fixed_cursor(),
                needed: usize::MAX,
                len: stream.remaining(),
            })?;
        let start = stream.reserve_var(records)?;

        // Elements with variable content are walked once here so that
        // content is bounds-checked and the parent's variable cursor moves
        // past it. The views themselves are not kept.
        if !T::FIXED_ONLY {
            let saved = stream.enter(start);
            for _ in 0..count {
                T::read(stream)?;
            }
            stream.leave(saved, start + records)?;
        }

        Ok(ListView {
            bytes: stream.buffer(),
            records: start,
            content: start + records,
            count,
            _element: PhantomData,
        })
    }

    fn to_owned_value(view: &ListView<'_, T>) -> Self {
        view.iter().map(|item| T::to_owned_value(&item)).collect()
    }
}

fn length_field(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| CodecError::TooLarge { size: len })
}

/// A decoded list that points at its records in the receive buffer.
///
/// Nothing is copied out on decode; elements are decoded on access. Every
/// element was bounds-checked when the list was read, so access cannot run
/// past the buffer.
pub struct ListView<'a, T: Wire> {
    bytes: &'a [u8],
    records: usize,
    content: usize,
    count: usize,
    _element: PhantomData<fn() -> T>,
}

impl<'a, T: Wire> ListView<'a, T> {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Element `index`, or `None` past the end.
    ///
    /// Constant time for elements without variable content. Otherwise the
    /// preceding elements are walked to find where this one's content
    /// starts.
    pub fn get(&self, index: usize) -> Option<T::View<'a>> {
        if index >= self.count {
            return None;
        }
        if T::FIXED_ONLY {
            let at = self.records + index * T::FIXED_SIZE;
            let mut stream = ReadStream::new(self.bytes, at, self.content).ok()?;
            return T::read(&mut stream).ok();
        }
        self.iter().nth(index)
    }

    pub fn iter(&self) -> ListIter<'a, T> {
        ListIter {
            stream: ReadStream::new(self.bytes, self.records, self.content).ok(),
            left: self.count,
            _element: PhantomData,
        }
    }
}

/// Iterator over a [`ListView`], decoding one element per step.
pub struct ListIter<'a, T: Wire> {
    stream: Option<ReadStream<'a>>,
    left: usize,
    _element: PhantomData<fn() -> T>,
}

impl<'a, T: Wire> Iterator for ListIter<'a, T> {
    type Item = T::View<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.left == 0 {
            return None;
        }
        let stream = self.stream.as_mut()?;
        self.left -= 1;
        match T::read(stream) {
            Ok(item) => Some(item),
            Err(_) => {
                self.left = 0;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.left, Some(self.left))
    }
}

impl<T: Wire> ExactSizeIterator for ListIter<'_, T> {}

impl<'a, T: Wire> IntoIterator for ListView<'a, T> {
    type Item = T::View<'a>;
    type IntoIter = ListIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T: Wire> IntoIterator for &ListView<'a, T> {
    type Item = T::View<'a>;
    type IntoIter = ListIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Wire> Clone for ListView<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Wire> Copy for ListView<'_, T> {}

impl<'a, T: Wire> PartialEq for ListView<'a, T>
where
    T::View<'a>: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.count == other.count && self.iter().eq(other.iter())
    }
}

impl<'a, T: Wire> fmt::Debug for ListView<'a, T>
where
    T::View<'a>: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode<T: Wire>(value: &T) -> Vec<u8> {
        let mut measure = MeasureStream::new();
        value.measure(&mut measure);
        let mut stream = WriteStream::allocate(measure.cursor(), T::FIXED_SIZE).unwrap();
        value.write(&mut stream).unwrap();
        stream.finish(T::FIXED_SIZE).unwrap().to_vec()
    }

    fn decode<T: Wire>(bytes: &[u8]) -> Result<T> {
        let mut stream = ReadStream::new(bytes, 0, T::FIXED_SIZE)?;
        let view = T::read(&mut stream)?;
        stream.finish(T::FIXED_SIZE)?;
        Ok(T::to_owned_value(&view))
    }

    #[test]
    fn numbers_are_little_endian() {
        assert_eq!(encode(&0x0102_0304u32), [4, 3, 2, 1]);
        assert_eq!(encode(&1.5f32), 1.5f32.to_le_bytes());
        assert_eq!(encode(&u64::MAX), [0xFF; 8]);
    }

    #[test]
    fn text_has_no_terminator() {
        assert_eq!(encode(&String::from("CPU")), b"\x03\x00\x00\x00CPU");
        assert_eq!(encode(&String::new()), [0, 0, 0, 0]);
    }

    #[test]
    fn text_keeps_multibyte_characters() {
        let text = String::from("温度 °C");
        assert_eq!(decode::<String>(&encode(&text)).unwrap(), text);
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let bytes = b"\x02\x00\x00\x00\xC3\x28";
        let err = decode::<String>(bytes).unwrap_err();
        assert!(matches!(err, CodecError::InvalidUtf8 { offset: 4 }));
    }

    #[test]
    fn text_length_past_end_is_truncated() {
        let bytes = b"\x10\x00\x00\x00abc";
        assert!(matches!(
            decode::<String>(bytes).unwrap_err(),
            CodecError::Truncated { .. }
        ));
    }

    #[test]
    fn list_records_precede_their_content() {
        let list = vec![String::from("ab"), String::from("c")];
        let bytes = encode(&list);

        // count, two length records, then the text bytes in element order
        assert_eq!(
            bytes,
            b"\x02\x00\x00\x00\x02\x00\x00\x00\x01\x00\x00\x00abc".to_vec()
        );
        assert_eq!(decode::<Vec<String>>(&bytes).unwrap(), list);
    }

    #[test]
    fn nested_lists_decode() {
        let nested = vec![vec![1u32, 2], vec![], vec![3]];
        let bytes = encode(&nested);

        let mut stream = ReadStream::new(&bytes, 0, 4).unwrap();
        let view = Vec::<Vec<u32>>::read(&mut stream).unwrap();
        stream.finish(4).unwrap();

        assert_eq!(view.len(), 3);
        assert_eq!(view.get(0).unwrap().iter().collect::<Vec<_>>(), [1, 2]);
        assert!(view.get(1).unwrap().is_empty());
        assert_eq!(view.get(2).unwrap().get(0), Some(3));
        assert!(view.get(3).is_none());
        assert_eq!(Vec::<Vec<u32>>::to_owned_value(&view), nested);
    }

    #[test]
    fn huge_list_count_is_rejected_without_allocating() {
        let bytes = b"\xFF\xFF\xFF\xFF";
        assert!(matches!(
            decode::<Vec<u64>>(bytes).unwrap_err(),
            CodecError::Truncated { .. }
        ));
    }

    #[test]
    fn list_view_iterates_in_order() {
        let bytes = encode(&vec![10u32, 20, 30]);
        let mut stream = ReadStream::new(&bytes, 0, 4).unwrap();
        let view = Vec::<u32>::read(&mut stream).unwrap();

        let collected: Vec<u32> = view.iter().collect();
        assert_eq!(collected, [10, 20, 30]);
        assert_eq!(view.iter().len(), 3);
        let summed: u32 = view.into_iter().sum();
        assert_eq!(summed, 60);
    }

    #[test]
    fn fixed_list_elements_are_addressed_directly() {
        let bytes = encode(&vec![5u64, 6, 7, 8]);
        let mut stream = ReadStream::new(&bytes, 0, 4).unwrap();
        let view = Vec::<u64>::read(&mut stream).unwrap();
        stream.finish(4).unwrap();

        assert_eq!(view.get(3), Some(8));
        assert_eq!(view.get(1), Some(6));
        assert_eq!(view.get(4), None);
    }

    #[test]
    fn list_text_points_into_the_buffer() {
        let bytes = encode(&vec![String::from("alpha"), String::from("beta")]);
        let mut stream = ReadStream::new(&bytes, 0, 4).unwrap();
        let view = Vec::<String>::read(&mut stream).unwrap();
        stream.finish(4).unwrap();

        let second = view.get(1).unwrap();
        assert_eq!(second, "beta");
        assert!(bytes.as_ptr_range().contains(&second.as_ptr()));
        assert_eq!(view.get(0), Some("alpha"));
    }

    #[test]
    fn bad_element_content_fails_when_the_list_is_read() {
        // count 2, lengths 1 and 9, but only 2 content bytes follow
        let bytes = b"\x02\x00\x00\x00\x01\x00\x00\x00\x09\x00\x00\x00ab";
        let mut stream = ReadStream::new(bytes, 0, 4).unwrap();
        assert!(matches!(
            Vec::<String>::read(&mut stream).unwrap_err(),
            CodecError::Truncated { .. }
        ));
    }
}

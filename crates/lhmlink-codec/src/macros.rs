/// Declare a struct and its [`Wire`](crate::Wire) encoding from one field
/// list.
///
/// Fields are measured, written and read in declaration order, so the three
/// passes can't drift apart.
///
/// With `=> ViewName`, a borrowing view struct is generated alongside,
/// holding each field's `Wire::View`. Without it the struct is its own view,
/// which only works when every field is a fixed-size primitive.
///
/// ```
/// use lhmlink_codec::wire_struct;
///
/// wire_struct! {
///     #[derive(Debug, Clone, PartialEq)]
///     pub struct Reading => ReadingView {
///         pub label: String,
///         pub value: f32,
///     }
/// }
///
/// wire_struct! {
///     #[derive(Debug, Clone, Copy, PartialEq)]
///     pub struct Extent {
///         pub width: u32,
///         pub height: u32,
///     }
/// }
/// ```
#[macro_export]
macro_rules! wire_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident => $view:ident {
            $( $(#[$fmeta:meta])* $fvis:vis $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $(#[$fmeta])* $fvis $field: $ty, )*
        }

        #[doc = concat!("Borrowed view of a decoded [`", stringify!($name), "`].")]
        #[derive(Debug, Clone, PartialEq)]
        $vis struct $view<'a> {
            $( $fvis $field: <$ty as $crate::Wire>::View<'a>, )*
        }

        impl $crate::Wire for $name {
            const FIXED_SIZE: usize = 0 $( + <$ty as $crate::Wire>::FIXED_SIZE )*;
            const FIXED_ONLY: bool = true $( && <$ty as $crate::Wire>::FIXED_ONLY )*;
            type View<'a> = $view<'a>;

            fn measure(&self, stream: &mut $crate::MeasureStream) {
                $( $crate::Wire::measure(&self.$field, stream); )*
            }

            fn write(&self, stream: &mut $crate::WriteStream) -> $crate::Result<()> {
                $( $crate::Wire::write(&self.$field, stream)?; )*
                Ok(())
            }

            fn read<'a>(stream: &mut $crate::ReadStream<'a>) -> $crate::Result<$view<'a>> {
                Ok($view {
                    $( $field: <$ty as $crate::Wire>::read(stream)?, )*
                })
            }

            fn to_owned_value(view: &$view<'_>) -> Self {
                Self {
                    $( $field: <$ty as $crate::Wire>::to_owned_value(&view.$field), )*
                }
            }
        }
    };

    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$fmeta:meta])* $fvis:vis $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $(#[$fmeta])* $fvis $field: $ty, )*
        }

        impl $crate::Wire for $name {
            const FIXED_SIZE: usize = 0 $( + <$ty as $crate::Wire>::FIXED_SIZE )*;
            const FIXED_ONLY: bool = true $( && <$ty as $crate::Wire>::FIXED_ONLY )*;
            type View<'a> = Self;

            #[allow(unused_variables)]
            fn measure(&self, stream: &mut $crate::MeasureStream) {
                $( $crate::Wire::measure(&self.$field, stream); )*
            }

            #[allow(unused_variables)]
            fn write(&self, stream: &mut $crate::WriteStream) -> $crate::Result<()> {
                $( $crate::Wire::write(&self.$field, stream)?; )*
                Ok(())
            }

            #[allow(unused_variables)]
            fn read<'a>(stream: &mut $crate::ReadStream<'a>) -> $crate::Result<Self> {
                Ok(Self {
                    $( $field: <$ty as $crate::Wire>::read(stream)?, )*
                })
            }

            #[allow(unused_variables)]
            fn to_owned_value(view: &Self) -> Self {
                Self {
                    $( $field: <$ty as $crate::Wire>::to_owned_value(&view.$field), )*
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::{MeasureStream, ReadStream, Wire, WriteStream};

    wire_struct! {
        #[derive(Debug, Clone, PartialEq)]
        struct Gauge => GaugeView {
            label: String,
            scale: f32,
            samples: Vec<u16>,
            id: u64,
        }
    }

    wire_struct! {
        #[derive(Debug, Clone, Copy, PartialEq)]
        struct Point {
            x: i32,
            y: i32,
        }
    }

    wire_struct! {
        #[derive(Debug, Clone, PartialEq)]
        struct Nothing {}
    }

    fn encode<T: Wire>(value: &T) -> Vec<u8> {
        let mut measure = MeasureStream::new();
        value.measure(&mut measure);
        let mut stream = WriteStream::allocate(measure.cursor(), T::FIXED_SIZE).unwrap();
        value.write(&mut stream).unwrap();
        stream.finish(T::FIXED_SIZE).unwrap().to_vec()
    }

    #[test]
    fn fixed_size_sums_fields() {
        assert_eq!(Gauge::FIXED_SIZE, 4 + 4 + 4 + 8);
        assert_eq!(Point::FIXED_SIZE, 8);
        assert_eq!(Nothing::FIXED_SIZE, 0);
        assert!(!Gauge::FIXED_ONLY);
        assert!(Point::FIXED_ONLY);
        assert!(Nothing::FIXED_ONLY);
    }

    #[test]
    fn struct_fields_keep_declaration_order() {
        let gauge = Gauge {
            label: String::from("fan"),
            scale: 0.5,
            samples: vec![7, 8],
            id: 42,
        };
        let bytes = encode(&gauge);

        let mut expected = Vec::new();
        expected.extend_from_slice(&3u32.to_le_bytes());
        expected.extend_from_slice(&0.5f32.to_le_bytes());
        expected.extend_from_slice(&2u32.to_le_bytes());
        expected.extend_from_slice(&42u64.to_le_bytes());
        expected.extend_from_slice(b"fan");
        expected.extend_from_slice(&7u16.to_le_bytes());
        expected.extend_from_slice(&8u16.to_le_bytes());
        assert_eq!(bytes, expected);

        let mut stream = ReadStream::new(&bytes, 0, Gauge::FIXED_SIZE).unwrap();
        let view = Gauge::read(&mut stream).unwrap();
        stream.finish(Gauge::FIXED_SIZE).unwrap();

        assert_eq!(view.label, "fan");
        assert_eq!(view.samples.iter().collect::<Vec<_>>(), [7, 8]);
        assert_eq!(Gauge::to_owned_value(&view), gauge);
    }

    #[test]
    fn fixed_struct_is_its_own_view() {
        let point = Point { x: -1, y: 2 };
        let bytes = encode(&point);
        assert_eq!(bytes.len(), 8);

        let mut stream = ReadStream::new(&bytes, 0, 8).unwrap();
        let view: Point = Point::read(&mut stream).unwrap();
        assert_eq!(view, point);
    }

    #[test]
    fn empty_struct_encodes_to_nothing() {
        assert!(encode(&Nothing {}).is_empty());
    }
}

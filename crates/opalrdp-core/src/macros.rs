//! Helper macros used by the wire codecs.

/// Resolves to the path of the enclosing function.
#[macro_export]
macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            core::any::type_name::<T>()
        }
        let name = type_name_of(f);
        &name[..name.len() - 3]
    }};
}

/// Returns early with a "not enough bytes" error when the cursor holds
/// fewer than `size` bytes.
#[macro_export]
macro_rules! ensure_size {
    (ctx: $ctx:expr, in: $buf:ident, size: $expected:expr) => {{
        let received = $buf.len();
        let expected = $expected;
        if received < expected {
            return Err($crate::not_enough_bytes_err($ctx, received, expected));
        }
    }};
    (in: $buf:ident, size: $expected:expr) => {{
        $crate::ensure_size!(ctx: $crate::function!(), in: $buf, size: $expected)
    }};
}

/// `ensure_size!` against `Self::FIXED_PART_SIZE`, with `Self::NAME` as context.
#[macro_export]
macro_rules! ensure_fixed_part_size {
    (in: $buf:ident) => {{
        $crate::ensure_size!(ctx: Self::NAME, in: $buf, size: Self::FIXED_PART_SIZE)
    }};
}

#[macro_export]
macro_rules! invalid_field_err {
    ($ctx:expr, $field:expr, $reason:expr $(,)?) => {{
        $crate::invalid_field_err($ctx, $field, $reason)
    }};
    ($field:expr, $reason:expr $(,)?) => {{
        $crate::invalid_field_err($crate::function!(), $field, $reason)
    }};
}

#[macro_export]
macro_rules! unexpected_message_type_err {
    ($ctx:expr, $got:expr $(,)?) => {{
        $crate::unexpected_message_type_err($ctx, $got)
    }};
}

#[macro_export]
macro_rules! unsupported_version_err {
    ($ctx:expr, $got:expr $(,)?) => {{
        $crate::unsupported_version_err($ctx, $got)
    }};
}

#[macro_export]
macro_rules! other_err {
    ($ctx:expr, source: $source:expr $(,)?) => {{
        $crate::other_err_with_source($ctx, "", $source)
    }};
    ($ctx:expr, $description:expr $(,)?) => {{
        $crate::other_err($ctx, $description)
    }};
    ($description:expr $(,)?) => {{
        $crate::other_err($crate::function!(), $description)
    }};
}

/// Numeric length conversion; failure is reported as an invalid field.
#[macro_export]
macro_rules! cast_length {
    ($ctx:expr, $field:expr, $len:expr) => {{
        ::core::convert::TryFrom::try_from($len)
            .map_err(|_| $crate::invalid_field_err($ctx, $field, "too large for the wire encoding"))
    }};
    ($field:expr, $len:expr) => {{
        $crate::cast_length!($crate::function!(), $field, $len)
    }};
}

/// Skips `n` padding bytes on read.
#[macro_export]
macro_rules! read_padding {
    ($src:expr, $n:expr) => {{
        $src.advance($n)
    }};
}

/// Writes `n` zero padding bytes.
#[macro_export]
macro_rules! write_padding {
    ($dst:expr, $n:expr) => {{
        for _ in 0..$n {
            $dst.write_u8(0);
        }
    }};
}

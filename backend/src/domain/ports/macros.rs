//! `define_port_error!` builds a port's error enum together with one
//! snake_case constructor per variant.
//!
//! String-like fields accept anything `Into<T>`, so adapters can write
//! `CatalogRepositoryError::query("...")` or pass an owned `String`.

macro_rules! define_port_error {
    (@ctor $variant:ident) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]() -> Self {
                Self::$variant
            }
        }
    };

    (@ctor $variant:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        define_port_error!(@ctor_impl $variant () () $( $field : $ty, )*);
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) ) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]($($params)*) -> Self {
                Self::$variant { $($inits)* }
            }
        }
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) $field:ident : $ty:ty, $($rest:tt)*) => {
        define_port_error!(
            @ctor_impl
            $variant
            ($($params)* $field: impl Into<$ty>,)
            ($($inits)* $field: $field.into(),)
            $($rest)*
        );
    };
    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $message:expr
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $($field : $ty),* } )?,
            )*
        }

        impl $name {
            $(
                define_port_error!(@ctor $variant $( { $($field : $ty),* } )?);
            )*
        }
    };
}

pub(crate) use define_port_error;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    define_port_error! {
        pub enum ShelfError {
            Offline => "shelf offline",
            Missing { code: String } => "no item filed under {code}",
            Full { capacity: u32 } => "shelf holds at most {capacity} items",
            Jammed { code: String, slot: u32 } => "{code} stuck in slot {slot}",
        }
    }

    #[rstest]
    fn unit_variants_get_nullary_constructors() {
        assert_eq!(ShelfError::offline(), ShelfError::Offline);
        assert_eq!(ShelfError::offline().to_string(), "shelf offline");
    }

    #[rstest]
    fn string_fields_accept_borrowed_and_owned_values() {
        assert_eq!(
            ShelfError::missing("INV_IC2_0001"),
            ShelfError::missing(String::from("INV_IC2_0001"))
        );
        assert_eq!(
            ShelfError::missing("INV_IC2_0001").to_string(),
            "no item filed under INV_IC2_0001"
        );
    }

    #[rstest]
    fn numeric_and_mixed_fields_keep_their_types() {
        assert_eq!(ShelfError::full(12_u32).to_string(), "shelf holds at most 12 items");
        assert_eq!(
            ShelfError::jammed("INV_IC2_0002", 3_u32).to_string(),
            "INV_IC2_0002 stuck in slot 3"
        );
    }
}

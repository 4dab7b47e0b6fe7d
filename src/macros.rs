#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Build a [`ParamValues`](crate::ParamValues) map from `key => value` pairs.
///
/// ```
/// use treeroute::{ParamValue, params};
///
/// let p = params! { "id" => 42, "q" => "shoes" };
/// assert_eq!(p.get("id"), Some(&ParamValue::Int(42)));
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::ParamValues::new()
    };
    ( $($key:expr => $value:expr),+ $(,)? ) => {{
        let mut values = $crate::ParamValues::new();
        $( values.insert($key, $crate::ParamValue::from($value)); )+
        values
    }};
}

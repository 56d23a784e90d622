#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Builds an [`ArgSet`](crate::ArgSet) from raw string tokens, with name
/// parsing enabled. Mostly a convenience for tests and trigger factories:
///
/// ```
/// let set = happenstance::argset!["cd=80", "power=0.3"];
/// assert_eq!(set.by_name(&["cd"]).unwrap().as_i32(), 80);
/// ```
#[macro_export]
macro_rules! argset {
    ($($raw:expr),* $(,)?) => {
        $crate::ArgSet::new(&[$($raw),*] as &[&str])
    };
}

//! Helpers exported for the crate's own tests.

/// Builds a [`crate::Value`] tree from JSON-shaped syntax.
///
/// ```
/// use tendril::tree;
/// let t = tree!({"name": "Alice", "tags": [1, 2]});
/// ```
#[macro_export]
macro_rules! tree {
    ($($body:tt)*) => {
        $crate::Value::from($crate::__serde_json::json!($($body)*))
    };
}

/// Builds a [`crate::Bindings`] / plan map from `name => value` pairs;
/// values go through [`tree!`].
#[macro_export]
macro_rules! bindings {
    ($($name:expr => $value:tt),* $(,)?) => {{
        let mut map = $crate::Bindings::new();
        $(map.insert($name.to_string(), $crate::tree!($value));)*
        map
    }};
}

pub mod dsl {
    use crate::value::Value;

    pub fn n(x: f64) -> Value {
        Value::Number(x)
    }

    pub fn s(text: &str) -> Value {
        Value::String(text.to_string())
    }

    pub fn b(flag: bool) -> Value {
        Value::Bool(flag)
    }

    pub fn seq(items: Vec<Value>) -> Value {
        Value::Seq(items)
    }
}

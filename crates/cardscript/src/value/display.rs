//! Display and Debug implementations for ScriptValue

use std::fmt;

use super::*;

impl fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Nil => write!(f, "nil"),
            ScriptValue::Bool(b) => write!(f, "{}", b),
            ScriptValue::Int(n) => write!(f, "{}", n),
            ScriptValue::Real(n) => write!(f, "{:?}", n),
            ScriptValue::String(s) => write!(f, "{:?}", s.as_str()),
            ScriptValue::Color(c) => write!(f, "rgba({}, {}, {}, {})", c.r, c.g, c.b, c.a),

            ScriptValue::Collection(items) => {
                write!(f, "[")?;
                for (i, (key, value)) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if items.is_list() {
                        write!(f, "{:?}", value)?;
                    } else {
                        write!(f, "{}: {:?}", key, value)?;
                    }
                }
                write!(f, "]")
            }

            ScriptValue::Object(obj) => write!(f, "<{}>", obj.type_name()),
            ScriptValue::Iterator(_) => write!(f, "<iterator>"),
            ScriptValue::Script(_) => write!(f, "<script>"),
            ScriptValue::Builtin(b) => write!(f, "<builtin {}>", b.name),
            ScriptValue::Closure(c) => write!(f, "<closure of {:?}>", c.function),
            ScriptValue::Composition(c) => write!(f, "<{:?} + {:?}>", c.first, c.second),
            ScriptValue::Error(e) => write!(f, "<error: {}>", e),
        }
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Strings display without quotes
            ScriptValue::String(s) => write!(f, "{}", s),
            ScriptValue::Real(n) => write!(f, "{}", n),
            ScriptValue::Color(c) if c.a == 255 => write!(f, "rgb({}, {}, {})", c.r, c.g, c.b),
            _ => write!(f, "{:?}", self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_scalars() {
        assert_eq!(ScriptValue::Nil.to_string(), "nil");
        assert_eq!(ScriptValue::Int(-3).to_string(), "-3");
        assert_eq!(ScriptValue::Real(3.5).to_string(), "3.5");
        assert_eq!(ScriptValue::string("hi").to_string(), "hi");
        assert_eq!(format!("{:?}", ScriptValue::string("hi")), "\"hi\"");
    }

    #[test]
    fn test_display_collections() {
        let list = ScriptValue::list(vec![ScriptValue::Int(1), ScriptValue::Int(2)]);
        assert_eq!(list.to_string(), "[1, 2]");
        let rec = ScriptValue::collection(Collection::from_entries(vec![(
            Some("a".to_string()),
            ScriptValue::Bool(true),
        )]));
        assert_eq!(rec.to_string(), "[a: true]");
    }

    #[test]
    fn test_display_color() {
        assert_eq!(
            ScriptValue::Color(Color::rgb(1, 2, 3)).to_string(),
            "rgb(1, 2, 3)"
        );
        assert_eq!(
            ScriptValue::Color(Color::rgba(1, 2, 3, 4)).to_string(),
            "rgba(1, 2, 3, 4)"
        );
    }
}

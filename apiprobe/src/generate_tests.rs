#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::generate::*;
    use crate::schema::{Schema, TypeSet};
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use serde_json::json;

    fn int_schema(min: Option<f64>, max: Option<f64>, emin: bool, emax: bool) -> Schema {
        Schema {
            schema_type: TypeSet::single("integer"),
            minimum: min,
            maximum: max,
            exclusive_minimum: emin,
            exclusive_maximum: emax,
            ..Schema::default()
        }
    }

    #[test]
    fn test_int_exclusive_minimum_is_honored() {
        let s = int_schema(Some(5.0), Some(7.0), true, false);
        for _ in 0..100 {
            let v = generate_int(&s).unwrap();
            assert!(v > 5, "got {v}");
            assert!(v <= 7, "got {v}");
        }
    }

    #[test]
    fn test_int_inclusive_bounds() {
        let s = int_schema(Some(3.0), Some(10.0), false, false);
        for _ in 0..100 {
            let v = generate_int(&s).unwrap();
            assert!(v > 3 && v < 10, "got {v}");
        }
    }

    #[test]
    fn test_int_default_range_when_unbounded() {
        let s = int_schema(None, None, false, false);
        for _ in 0..100 {
            let v = generate_int(&s).unwrap();
            assert!((0..10000).contains(&v), "got {v}");
        }
    }

    #[test]
    fn test_float_conflicting_bounds_error() {
        let s = int_schema(Some(9.0), Some(3.0), false, false);
        match generate_float(&s) {
            Err(Error::Invalid(_)) => {}
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_float_default_range() {
        let s = int_schema(None, None, false, false);
        for _ in 0..100 {
            let v = generate_float(&s).unwrap();
            assert!((-1.0..1.0).contains(&v), "got {v}");
        }
    }

    #[test]
    fn test_float_exclusive_maximum_shifts() {
        let s = int_schema(Some(1.0), Some(2.0), false, true);
        for _ in 0..100 {
            let v = generate_float(&s).unwrap();
            assert!((1.0..1.99).contains(&v), "got {v}");
        }
    }

    #[test]
    fn test_float_single_bound_synthesizes_counterpart() {
        let s = int_schema(Some(4.0), None, false, false);
        for _ in 0..50 {
            let v = generate_float(&s).unwrap();
            assert!((4.0..8.0).contains(&v), "got {v}");
        }
    }

    fn string_schema(format: Option<&str>, pattern: Option<&str>) -> Schema {
        Schema {
            schema_type: TypeSet::single("string"),
            format: format.map(str::to_owned),
            pattern: pattern.map(str::to_owned),
            ..Schema::default()
        }
    }

    #[test]
    fn test_string_date_time_is_rfc3339() {
        let s = string_schema(Some("date-time"), None);
        let v = generate_string(&s, "x_").unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&v).is_ok(), "got {v}");
    }

    #[test]
    fn test_string_date_parses() {
        let s = string_schema(Some("date"), None);
        let v = generate_string(&s, "x_").unwrap();
        assert!(
            chrono::NaiveDate::parse_from_str(&v, "%Y-%m-%d").is_ok(),
            "got {v}"
        );
    }

    #[test]
    fn test_string_pattern_directed() {
        let s = string_schema(None, Some("[a-f]{8}"));
        let re = regex::Regex::new("^[a-f]{8}$").unwrap();
        for _ in 0..20 {
            let v = generate_string(&s, "x_").unwrap();
            assert!(re.is_match(&v), "got {v}");
        }
    }

    #[test]
    fn test_string_prefix_fallback() {
        let s = string_schema(None, None);
        let v = generate_string(&s, "name_").unwrap();
        assert!(v.starts_with("name_"), "got {v}");
        let digits = &v["name_".len()..];
        assert!(digits.len() >= 5 && digits.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_string_byte_format_is_base64() {
        let s = string_schema(Some("byte"), None);
        let v = generate_string(&s, "x_").unwrap();
        assert!(BASE64.decode(&v).is_ok(), "got {v}");
    }

    #[test]
    fn test_string_binary_format_is_hex() {
        let s = string_schema(Some("binary"), None);
        let v = generate_string(&s, "x_").unwrap();
        assert!(hex::decode(&v).is_ok(), "got {v}");
        assert_eq!(v, v.to_lowercase());
    }

    #[test]
    fn test_string_uri_format() {
        let s = string_schema(Some("uri"), None);
        let v = generate_string(&s, "x_").unwrap();
        assert!(v.starts_with("https://www.google.com/search?q="));
    }

    #[test]
    fn test_string_password_is_raw() {
        let s = string_schema(Some("password"), None);
        let v = generate_string(&s, "pw_").unwrap();
        assert!(v.starts_with("pw_"));
    }

    #[test]
    fn test_string_unknown_format_error() {
        let s = string_schema(Some("ipv6"), None);
        match generate_string(&s, "x_") {
            Err(Error::Invalid(_)) => {}
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_enum_pick_is_member() {
        let values = vec![json!("a"), json!("b"), json!(3)];
        for _ in 0..20 {
            let v = generate_enum(&values);
            assert!(values.contains(&v));
        }
    }

    #[test]
    fn test_file_contents_shape() {
        let v = generate_file_contents();
        assert_eq!(v.len(), 200);
        assert!(v.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_bool_is_bool() {
        assert!(generate_bool().is_boolean());
    }
}

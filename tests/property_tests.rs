//! Property-based tests for value conversion, parameter binding and
//! driver round trips using proptest

use proptest::prelude::*;
use rust_db_access::core::error::fingerprint;
use rust_db_access::prelude::*;

// ============================================================================
// Value Conversion Tests
// ============================================================================

proptest! {
    /// Integers convert to any integer type wide enough to hold them
    #[test]
    fn test_integer_widening(value in any::<i32>()) {
        let db_val = DatabaseValue::from(value);
        prop_assert_eq!(db_val.convert::<i64>("n").unwrap(), i64::from(value));
        prop_assert_eq!(db_val.convert::<i32>("n").unwrap(), value);
        prop_assert_eq!(db_val.convert::<f64>("n").unwrap(), f64::from(value));
    }

    /// Narrowing succeeds exactly when the value fits
    #[test]
    fn test_integer_narrowing(value in any::<i64>()) {
        let db_val = DatabaseValue::from(value);
        match i32::try_from(value) {
            Ok(narrow) => prop_assert_eq!(db_val.convert::<i32>("n").unwrap(), narrow),
            Err(_) => {
                let err = db_val.convert::<i32>("n").unwrap_err();
                prop_assert_eq!(err.kind(), ErrorKind::Conversion);
            }
        }
        match u8::try_from(value) {
            Ok(narrow) => prop_assert_eq!(db_val.convert::<u8>("n").unwrap(), narrow),
            Err(_) => prop_assert!(db_val.convert::<u8>("n").is_err()),
        }
    }

    /// Nulls map to None for optional targets and fail for the rest
    #[test]
    fn test_null_mapping(column in "[A-Za-z][A-Za-z0-9_]{0,15}") {
        let null = DatabaseValue::Null;
        prop_assert_eq!(null.convert::<Option<i64>>(&column).unwrap(), None);
        prop_assert_eq!(null.convert::<Option<String>>(&column).unwrap(), None);

        let err = null.convert::<i64>(&column).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::NullMapping);
        prop_assert!(err.to_string().contains(&column));
    }

    /// Numeric strings parse, everything else is a conversion error
    #[test]
    fn test_string_to_integer(value in any::<i64>(), junk in "[a-z]{1,8}") {
        let text = DatabaseValue::from(value.to_string());
        prop_assert_eq!(text.convert::<i64>("n").unwrap(), value);

        let junk = DatabaseValue::from(junk);
        prop_assert_eq!(junk.convert::<i64>("n").unwrap_err().kind(), ErrorKind::Conversion);
    }
}

// ============================================================================
// Parameter Binding Tests
// ============================================================================

proptest! {
    /// Re-binding a name never grows the set and the last value wins
    #[test]
    fn test_rebinding_keeps_names_unique(
        bindings in prop::collection::vec(("[a-c]", any::<i32>()), 1..40)
    ) {
        let mut set = ParameterSet::new();
        for (name, value) in &bindings {
            let spelled = if value % 2 == 0 { name.to_uppercase() } else { format!("@{}", name) };
            set.bind(&spelled, value).unwrap();
        }

        let mut distinct: Vec<&String> = bindings.iter().map(|(name, _)| name).collect();
        distinct.sort();
        distinct.dedup();
        prop_assert_eq!(set.len(), distinct.len());

        for name in distinct {
            let last = bindings.iter().rev().find(|(n, _)| n == name).map(|(_, v)| *v);
            let bound = set.get(name).map(|p| p.value.clone());
            prop_assert_eq!(bound, last.map(DatabaseValue::from));
        }
    }

    /// Fingerprints never carry line breaks and stay short
    #[test]
    fn test_fingerprint_is_single_line(sql in "[ -~\n\t]{0,400}") {
        let print = fingerprint(&sql);
        prop_assert!(!print.contains('\n'));
        prop_assert!(!print.contains('\t'));
        prop_assert!(!print.contains("  "));
        prop_assert!(print.chars().count() <= 99);
    }
}

// ============================================================================
// SQLite Round Trips
// ============================================================================

#[cfg(feature = "sqlite")]
mod sqlite_round_trips {
    use super::*;

    fn memory() -> Connection<'static> {
        Connection::open(&Profile::new("mem", "sqlite", ":memory:")).unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_long_round_trip(value in any::<i64>()) {
            let mut db = memory();
            let back: i64 = db.sql("SELECT @v").with_parameter("v", value).as_scalar().unwrap();
            prop_assert_eq!(back, value);
        }

        #[test]
        fn test_string_round_trip(value in "\\PC*") {
            let mut db = memory();
            let back: String = db.sql("SELECT :v").with_parameter("v", value.as_str()).as_scalar().unwrap();
            prop_assert_eq!(back, value);
        }

        #[test]
        fn test_bytes_round_trip(value in prop::collection::vec(any::<u8>(), 0..256)) {
            let mut db = memory();
            let back: Vec<u8> = db.sql("SELECT $v").with_parameter("v", value.clone()).as_scalar().unwrap();
            prop_assert_eq!(back, value);
        }

        #[test]
        fn test_double_round_trip(value in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
            let mut db = memory();
            let back: f64 = db.sql("SELECT @v").with_parameter("v", value).as_scalar().unwrap();
            prop_assert_eq!(back, value);
        }

        #[test]
        fn test_optional_round_trip(value in prop::option::of(any::<i32>())) {
            let mut db = memory();
            let back: Option<i32> = db.sql("SELECT @v").with_parameter("v", value).as_scalar().unwrap();
            prop_assert_eq!(back, value);
        }
    }
}

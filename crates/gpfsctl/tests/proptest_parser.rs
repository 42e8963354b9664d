//! Property-based tests for gpfsctl parsing and command construction.
//!
//! These tests check invariants of the record parser, the size coercion and
//! request validation over generated inputs.

use gpfsctl::coerce::{parse_size, SizeUnit};
use gpfsctl::command::{CommandBuilder, Operation, SetQuota};
use gpfsctl::mapper::FromRecord;
use gpfsctl::record::{parse_line, render_fields, OutputParser};
use gpfsctl::{GpfsError, Quota, SchemaVersion};
use proptest::prelude::*;

/// Field values including separators and escape characters.
fn any_field() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 :\\\\/._-]{0,12}"
}

/// Leading field that cannot be mistaken for a header or comment.
fn leading_field() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9:]{0,7}"
}

fn fileset_row() -> impl Strategy<Value = Vec<String>> {
    (leading_field(), proptest::collection::vec(any_field(), 6..=6)).prop_map(|(first, rest)| {
        let mut row = vec![first];
        row.extend(rest);
        row
    })
}

fn unit() -> impl Strategy<Value = (&'static str, u64)> {
    prop_oneof![
        Just(("", 1u64)),
        Just(("K", 1u64 << 10)),
        Just(("M", 1u64 << 20)),
        Just(("G", 1u64 << 30)),
        Just(("T", 1u64 << 40)),
    ]
}

proptest! {
    #[test]
    fn prop_render_then_parse_preserves_values(row in fileset_row()) {
        let line = render_fields(&row);
        let record = parse_line(&line, &SchemaVersion::FilesetV1.layout(), 1).unwrap();
        prop_assert_eq!(record.values(), row.as_slice());
        prop_assert_eq!(record.render(), line);
    }

    #[test]
    fn prop_parser_preserves_order(rows in proptest::collection::vec(fileset_row(), 0..20)) {
        let mut output = String::from("HEADER:fileset_v1\n");
        for row in &rows {
            output.push_str(&render_fields(row));
            output.push('\n');
        }
        let parsed = OutputParser::new(&[SchemaVersion::FilesetV1]).parse(&output).unwrap();
        prop_assert_eq!(parsed.records.len(), rows.len());
        for (record, row) in parsed.records.iter().zip(&rows) {
            prop_assert_eq!(record.values(), row.as_slice());
        }
    }

    #[test]
    fn prop_extra_fields_are_tolerated(row in fileset_row(), extra in proptest::collection::vec(any_field(), 0..=16)) {
        let mut full = row.clone();
        full.extend(extra.iter().cloned());
        let record = parse_line(&render_fields(&full), &SchemaVersion::FilesetV1.layout(), 1).unwrap();
        prop_assert_eq!(record.extra(), extra.as_slice());
        prop_assert_eq!(record.get("name"), Some(row[1].as_str()));
    }

    #[test]
    fn prop_missing_fields_are_malformed(row in fileset_row(), keep in 1usize..7) {
        let line = render_fields(&row[..keep]);
        let err = parse_line(&line, &SchemaVersion::FilesetV1.layout(), 4).unwrap_err();
        let is_malformed = matches!(err, GpfsError::MalformedRecord { line_no: 4, .. });
        prop_assert!(is_malformed);
    }

    #[test]
    fn prop_size_suffix_scales(n in 0u64..1_000_000, (suffix, mult) in unit()) {
        let raw = format!("{}{}", n, suffix);
        prop_assert_eq!(parse_size("f", &raw, SizeUnit::Bytes).unwrap(), Some(n * mult));
    }

    #[test]
    fn prop_size_is_monotonic(a in 0u64..1_000_000, b in 0u64..1_000_000, (suffix, _) in unit()) {
        let pa = parse_size("f", &format!("{}{}", a, suffix), SizeUnit::KiB).unwrap();
        let pb = parse_size("f", &format!("{}{}", b, suffix), SizeUnit::KiB).unwrap();
        prop_assert_eq!(a.cmp(&b), pa.cmp(&pb));
    }

    #[test]
    fn prop_quota_soft_never_above_hard(soft in 0u64..1_000_000, hard in 0u64..1_000_000) {
        let line = format!("fs1:USR:1:u:0:{}:{}:0:none:0:0:0:0:none:", soft, hard);
        let record = parse_line(&line, &SchemaVersion::QuotaV1.layout(), 1).unwrap();
        match Quota::from_record(&record) {
            Ok(quota) => {
                let (s, h) = (quota.blocks.soft.unwrap(), quota.blocks.hard.unwrap());
                prop_assert!(s == 0 || h == 0 || s <= h);
            }
            Err(GpfsError::FieldCoercion { field, .. }) => {
                prop_assert!(soft > hard && hard > 0);
                prop_assert_eq!(field, "blockquota");
            }
            Err(other) => prop_assert!(false, "unexpected error: {:?}", other),
        }
    }

    #[test]
    fn prop_set_quota_requires_exactly_one_scope(
        user in proptest::option::of("[a-z]{1,8}"),
        group in proptest::option::of("[a-z]{1,8}"),
        fileset in proptest::option::of("[a-z]{1,8}"),
    ) {
        let scopes = [&user, &group, &fileset].iter().filter(|s| s.is_some()).count();
        let request = SetQuota {
            device: "fs1".to_string(),
            user,
            group,
            fileset,
            block_soft: Some(1 << 20),
            ..SetQuota::default()
        };
        let result = CommandBuilder::default().build(&Operation::SetQuota(request));
        if scopes == 1 {
            prop_assert!(result.is_ok());
        } else {
            let rejected = matches!(
                result,
                Err(GpfsError::InvalidParameter { ref parameter, .. }) if parameter == "scope"
            );
            prop_assert!(rejected);
        }
    }

    #[test]
    fn prop_hard_limit_default_not_below_soft(soft in 0i64..(1 << 40)) {
        let request = SetQuota {
            device: "fs1".to_string(),
            user: Some("alice".to_string()),
            files_soft: Some(soft),
            ..SetQuota::default()
        };
        let inv = CommandBuilder::default().build(&Operation::SetQuota(request)).unwrap();
        let limits = inv.args.last().unwrap();
        let (s, h) = limits.split_once(':').unwrap();
        let (s, h): (u64, u64) = (s.parse().unwrap(), h.parse().unwrap());
        prop_assert!(h >= s);
    }
}

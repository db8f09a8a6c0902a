//! Property tests for table merge invariants.
//!
//! 1. Column union: every column of either input survives the merge
//! 2. Row union: the merged dates are exactly the union of input dates
//! 3. Cached values survive wherever the batch has no value
//! 4. Merged tables survive a CSV write/read unchanged

use chrono::NaiveDate;
use factorsync_core::{FactorTable, FieldName};
use proptest::prelude::*;
use std::collections::BTreeSet;

const NAMES: [&str; 6] = ["pe_ttm", "PB_MRQ", "fcfe", "qfa_roe", "Current", "mkt_cap_ard"];

fn arb_table() -> impl Strategy<Value = FactorTable> {
    prop::collection::vec(
        (
            0..40i64,
            0..NAMES.len(),
            prop::option::of((-1.0e6..1.0e6_f64).prop_map(|v| (v * 100.0).round() / 100.0)),
        ),
        0..30,
    )
    .prop_map(|cells| {
        let epoch = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
        let mut t = FactorTable::new();
        for (offset, col, value) in cells {
            t.set(epoch + chrono::Duration::days(offset * 30), NAMES[col], value);
        }
        t
    })
}

proptest! {
    #[test]
    fn merge_keeps_every_column(a in arb_table(), b in arb_table()) {
        let mut merged = a.clone();
        merged.merge(&b);

        let have: BTreeSet<&FieldName> = merged.field_names().iter().collect();
        for f in a.field_names().iter().chain(b.field_names()) {
            prop_assert!(have.contains(f));
        }
        prop_assert!(merged.width() >= a.width());
        prop_assert_eq!(&merged.columns()[..a.width()], a.columns());
    }

    #[test]
    fn merge_rows_are_union_of_dates(a in arb_table(), b in arb_table()) {
        let mut merged = a.clone();
        merged.merge(&b);

        let expected: BTreeSet<NaiveDate> = a.dates().chain(b.dates()).copied().collect();
        let got: Vec<NaiveDate> = merged.dates().copied().collect();
        prop_assert_eq!(got, expected.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn cached_values_survive_where_batch_is_empty(a in arb_table(), b in arb_table()) {
        let mut merged = a.clone();
        merged.merge(&b);

        for date in a.dates() {
            for f in a.field_names() {
                let expected = b.get(*date, f).or(a.get(*date, f));
                prop_assert_eq!(merged.get(*date, f), expected);
            }
        }
    }

    #[test]
    fn merged_table_survives_csv(a in arb_table(), b in arb_table()) {
        let mut merged = a.clone();
        merged.merge(&b);

        let mut buf = Vec::new();
        merged.write_csv(&mut buf).unwrap();
        let back = FactorTable::read_csv(buf.as_slice()).unwrap();
        prop_assert_eq!(back, merged);
    }
}

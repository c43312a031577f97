#![allow(missing_docs, unused_results)]

use proptest::prelude::*;

use snpdb_sql::{ColumnType, Table};
use snpdb_store::schema::fingerprint;

fn column_type() -> impl Strategy<Value = ColumnType> {
    prop_oneof![
        Just(ColumnType::Integer),
        Just(ColumnType::Text),
        (1u32..64).prop_map(ColumnType::Varchar),
        Just(ColumnType::Date),
        Just(ColumnType::DateTime),
        Just(ColumnType::Decimal),
    ]
}

fn columns() -> impl Strategy<Value = Vec<(String, ColumnType)>> {
    prop::collection::btree_set("[a-z]{1,6}", 2..6).prop_flat_map(|names| {
        let n = names.len();
        (
            Just(names.into_iter().collect::<Vec<_>>()),
            prop::collection::vec(column_type(), n),
        )
            .prop_map(|(names, types)| names.into_iter().zip(types).collect())
    })
}

fn table(columns: &[(String, ColumnType)]) -> Table {
    columns
        .iter()
        .fold(Table::new("T"), |t, (name, ty)| t.column(name.clone(), *ty))
}

fn table_fingerprint(table: &Table, sql: &str) -> String {
    fingerprint([(table.name(), sql)])
}

proptest! {
    #[test]
    fn whitespace_does_not_matter(columns in columns(), pad in "[ \t\n]{1,4}") {
        let t = table(&columns);
        let sql = t.create_sql().unwrap();
        let padded = sql
            .replace(", ", &format!("{pad},{pad}"))
            .replace('(', &format!("{pad}({pad}"))
            .replace(')', &format!("{pad}){pad}"));
        let padded = format!("{pad}{padded}{pad};");
        prop_assert_eq!(table_fingerprint(&t, &sql), table_fingerprint(&t, &padded));
    }

    #[test]
    fn reordering_columns_matters(columns in columns()) {
        let mut reversed = columns.clone();
        reversed.reverse();
        let (a, b) = (table(&columns), table(&reversed));
        prop_assert_ne!(
            table_fingerprint(&a, &a.create_sql().unwrap()),
            table_fingerprint(&b, &b.create_sql().unwrap())
        );
    }

    #[test]
    fn dropping_a_column_matters(columns in columns()) {
        let (a, b) = (table(&columns), table(&columns[1..]));
        prop_assert_ne!(
            table_fingerprint(&a, &a.create_sql().unwrap()),
            table_fingerprint(&b, &b.create_sql().unwrap())
        );
    }

    #[test]
    fn changing_a_type_matters(columns in columns()) {
        let mut changed = columns.clone();
        changed[0].1 = if changed[0].1 == ColumnType::Integer {
            ColumnType::Text
        } else {
            ColumnType::Integer
        };
        let (a, b) = (table(&columns), table(&changed));
        prop_assert_ne!(
            table_fingerprint(&a, &a.create_sql().unwrap()),
            table_fingerprint(&b, &b.create_sql().unwrap())
        );
    }

    #[test]
    fn declaration_order_of_objects_does_not_matter(names in prop::collection::btree_set("[A-Z][a-z]{1,5}", 1..5)) {
        let ddl: Vec<(String, String)> = names
            .iter()
            .map(|n| (n.clone(), format!("CREATE TABLE {n} (id INTEGER)")))
            .collect();
        let mut reversed = ddl.clone();
        reversed.reverse();
        prop_assert_eq!(fingerprint(ddl), fingerprint(reversed));
    }
}

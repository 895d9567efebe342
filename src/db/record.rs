//! Persistent record base: one table row mapped to a typed struct.
//!
//! Entities declare their table, primary-key column and ordered column set as
//! associated constants plus a `from_row` hydration; the persistence methods
//! are provided. `update` and `insert` mutate the store and then re-hydrate,
//! so the in-memory snapshot always reflects server-computed defaults.

use crate::db::store::{describe_value, Row, Store, StoreError};
use rusqlite::types::Value;

/// Name carried by an empty-constructed record.
pub const PLACEHOLDER_NAME: &str = "<no record>";

pub trait Record: Sized {
    const TABLE: &'static str;
    const ID_COLUMN: &'static str;
    const COLUMNS: &'static [&'static str];

    fn from_row(row: &Row) -> Result<Self, StoreError>;
    fn id(&self) -> i64;

    fn load_by_id(store: &Store, id: i64) -> Result<Self, StoreError> {
        Self::load_by_key(store, Self::ID_COLUMN, Value::Integer(id))
    }

    fn load_by_name(store: &Store, name: &str) -> Result<Self, StoreError> {
        Self::load_by_key(store, "name", Value::Text(name.to_string()))
    }

    /// Single-row lookup. Zero matches is `NotFound`; more than one is
    /// `Ambiguous` even if the schema should have prevented it, because this
    /// layer must not silently pick a row.
    fn load_by_key(store: &Store, column: &str, key: Value) -> Result<Self, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            Self::COLUMNS.join(", "),
            Self::TABLE,
            column
        );
        let described = format!("{} = {}", column, describe_value(&key));
        let rows = store.fetch_rows(&sql, &[key])?;
        match rows.len() {
            0 => Err(StoreError::NotFound {
                table: Self::TABLE,
                key: described,
            }),
            1 => Self::from_row(&rows[0]),
            matches => Err(StoreError::Ambiguous {
                table: Self::TABLE,
                key: described,
                matches,
            }),
        }
    }

    fn reload(&mut self, store: &Store) -> Result<(), StoreError> {
        *self = Self::load_by_id(store, self.id())?;
        Ok(())
    }

    /// Write the given fields in one statement keyed by primary key, then
    /// reload. Every field name is validated first, so a rejected call
    /// performs no mutation.
    fn update(&mut self, store: &Store, fields: &[(&str, Value)]) -> Result<(), StoreError> {
        Self::validate_columns(fields)?;
        if fields.is_empty() {
            return Ok(());
        }
        let assignments = fields
            .iter()
            .enumerate()
            .map(|(index, (column, _))| format!("{} = ?{}", column, index + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            Self::TABLE,
            assignments,
            Self::ID_COLUMN,
            fields.len() + 1
        );
        let mut params: Vec<Value> = fields.iter().map(|(_, value)| value.clone()).collect();
        params.push(Value::Integer(self.id()));
        store.execute(&sql, &params)?;
        self.reload(store)
    }

    /// Insert a new row and load it back via the generated primary key.
    fn insert(store: &Store, fields: &[(&str, Value)]) -> Result<Self, StoreError> {
        Self::validate_columns(fields)?;
        let sql = if fields.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", Self::TABLE)
        } else {
            let columns = fields.iter().map(|(column, _)| *column).collect::<Vec<_>>().join(", ");
            let placeholders = (1..=fields.len())
                .map(|index| format!("?{}", index))
                .collect::<Vec<_>>()
                .join(", ");
            format!("INSERT INTO {} ({}) VALUES ({})", Self::TABLE, columns, placeholders)
        };
        let params: Vec<Value> = fields.iter().map(|(_, value)| value.clone()).collect();
        store.execute(&sql, &params)?;
        Self::load_by_id(store, store.last_insert_id())
    }

    /// Every primary-key value in the table, in whatever order the store
    /// returns them.
    fn list_all_keys(store: &Store) -> Result<Vec<i64>, StoreError> {
        let sql = format!("SELECT {} FROM {}", Self::ID_COLUMN, Self::TABLE);
        store
            .fetch_rows(&sql, &[])?
            .iter()
            .map(|row| row.integer(Self::ID_COLUMN))
            .collect()
    }

    fn validate_columns(fields: &[(&str, Value)]) -> Result<(), StoreError> {
        for (column, _) in fields {
            if !Self::COLUMNS.iter().any(|known| known == column) {
                return Err(StoreError::UnknownColumn {
                    table: Self::TABLE,
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Widget {
        id: i64,
        name: String,
        size: i64,
    }

    impl Record for Widget {
        const TABLE: &'static str = "tb_widget";
        const ID_COLUMN: &'static str = "widget_id";
        const COLUMNS: &'static [&'static str] = &["widget_id", "name", "size"];

        fn from_row(row: &Row) -> Result<Self, StoreError> {
            Ok(Widget {
                id: row.integer("widget_id")?,
                name: row.text("name")?,
                size: row.integer("size")?,
            })
        }

        fn id(&self) -> i64 {
            self.id
        }
    }

    fn widget_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .execute(
                "CREATE TABLE tb_widget (
                     widget_id INTEGER PRIMARY KEY AUTOINCREMENT,
                     name TEXT NOT NULL,
                     size INTEGER NOT NULL DEFAULT (0)
                 )",
                &[],
            )
            .unwrap();
        store
    }

    fn insert_widget(store: &Store, name: &str, size: i64) -> Widget {
        Widget::insert(
            store,
            &[("name", Value::Text(name.into())), ("size", Value::Integer(size))],
        )
        .unwrap()
    }

    #[test]
    fn insert_then_load_round_trips_every_field() {
        let store = widget_store();
        let inserted = insert_widget(&store, "gasket", 12);
        let loaded = Widget::load_by_id(&store, inserted.id).unwrap();
        assert_eq!(loaded, inserted);
        assert_eq!(loaded.name, "gasket");
        assert_eq!(loaded.size, 12);
    }

    #[test]
    fn lookup_by_id_and_by_name_agree_field_for_field() {
        let store = widget_store();
        let inserted = insert_widget(&store, "flange", 3);
        let by_id = Widget::load_by_id(&store, inserted.id).unwrap();
        let by_name = Widget::load_by_name(&store, "flange").unwrap();
        assert_eq!(by_id, by_name);
    }

    #[test]
    fn update_reloads_server_state() {
        let store = widget_store();
        let mut widget = insert_widget(&store, "valve", 1);
        widget.update(&store, &[("size", Value::Integer(9))]).unwrap();
        assert_eq!(widget.size, 9);
        assert_eq!(Widget::load_by_id(&store, widget.id).unwrap().size, 9);
    }

    #[test]
    fn unknown_column_is_rejected_before_any_mutation() {
        let store = widget_store();
        let mut widget = insert_widget(&store, "pump", 4);
        let err = widget
            .update(
                &store,
                &[("size", Value::Integer(99)), ("colour", Value::Text("red".into()))],
            )
            .unwrap_err();
        match err {
            StoreError::UnknownColumn { table, column } => {
                assert_eq!(table, "tb_widget");
                assert_eq!(column, "colour");
            }
            other => panic!("expected UnknownColumn, got {:?}", other),
        }
        // the valid pair in the same call must not have been written either
        assert_eq!(Widget::load_by_id(&store, widget.id).unwrap().size, 4);

        assert!(matches!(
            Widget::insert(&store, &[("colour", Value::Text("red".into()))]),
            Err(StoreError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn missing_key_is_not_found() {
        let store = widget_store();
        assert!(matches!(
            Widget::load_by_id(&store, 404),
            Err(StoreError::NotFound { table: "tb_widget", .. })
        ));
        assert!(matches!(
            Widget::load_by_name(&store, "ghost"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn duplicate_lookup_key_is_ambiguous_not_first_match() {
        let store = widget_store();
        insert_widget(&store, "twin", 1);
        insert_widget(&store, "twin", 2);
        match Widget::load_by_name(&store, "twin") {
            Err(StoreError::Ambiguous { matches, .. }) => assert_eq!(matches, 2),
            other => panic!("expected Ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn list_all_keys_returns_every_primary_key() {
        let store = widget_store();
        let a = insert_widget(&store, "a", 1);
        let b = insert_widget(&store, "b", 2);
        let c = insert_widget(&store, "c", 3);
        assert_eq!(Widget::list_all_keys(&store).unwrap(), vec![a.id, b.id, c.id]);
    }
}

//! Prepared-statement tracker (spec.md §4.4): the per-connection map from
//! statement id to query text, parameter count, and current argument
//! values, mutated by PREPARE/SEND_LONG_DATA/RESET/EXECUTE/CLOSE.

use bytes::Bytes;
use std::collections::HashMap;

use crate::protocol::primitive::{read_int_1, read_int_4};
use crate::protocol::value::{self, ArgValue, NullBitmap};

/// One parameter slot. `Unset` renders as `NULL` with a warning (spec.md
/// §4.4); `Bound` holds whatever PREPARE/SEND_LONG_DATA/EXECUTE last wrote;
/// `Errored` holds the reason a bind couldn't decode the slot's value
/// (spec.md §7 "Rewrite-degraded"), rendered as a `/* bind error: ... */`
/// placeholder instead of silently keeping a stale value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgSlot {
    Unset,
    Bound(ArgValue),
    Errored(String),
}

impl ArgSlot {
    fn is_bytes(&self) -> bool {
        matches!(self, ArgSlot::Bound(ArgValue::Bytes(_)))
    }
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub query: Bytes,
    pub num_columns: u16,
    pub num_params: u16,
    pub args: Vec<ArgSlot>,
}

impl Statement {
    fn new(query: Bytes, num_columns: u16, num_params: u16) -> Self {
        Self {
            query,
            num_columns,
            num_params,
            args: vec![ArgSlot::Unset; num_params as usize],
        }
    }
}

/// Why an EXECUTE couldn't be fully bound (spec.md §7 "Rewrite-degraded").
/// Carries enough context for the dispatcher to still emit the statement
/// with a `/* bind error: ... */` placeholder instead of dropping the line.
#[derive(Debug, Clone, PartialEq)]
pub struct BindError {
    pub param_index: usize,
    pub reason: String,
}

/// Per-connection statement-id -> [`Statement`] map (spec.md §3 "Connection
/// pair": "the per-connection prepared-statement map is owned by the
/// dispatcher task and is not shared").
#[derive(Debug, Default)]
pub struct StatementStore {
    statements: HashMap<u32, Statement>,
}

impl StatementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a statement from a successful COM_STMT_PREPARE_OK response.
    /// `stmt_id` may already be present (the server re-issued an id after a
    /// CLOSE); the old entry is replaced without warning (spec.md §3).
    pub fn prepare(&mut self, stmt_id: u32, query: Bytes, num_columns: u16, num_params: u16) {
        self.statements
            .insert(stmt_id, Statement::new(query, num_columns, num_params));
    }

    pub fn get(&self, stmt_id: u32) -> Option<&Statement> {
        self.statements.get(&stmt_id)
    }

    pub fn close(&mut self, stmt_id: u32) {
        self.statements.remove(&stmt_id);
    }

    /// COM_STMT_SEND_LONG_DATA (spec.md §4.4): unknown id or out-of-range
    /// index is dropped silently; an unset slot is set, an existing byte
    /// string is appended to, anything else is left untouched.
    pub fn send_long_data(&mut self, stmt_id: u32, param_index: u16, data: &[u8]) {
        let Some(stmt) = self.statements.get_mut(&stmt_id) else {
            return;
        };
        let Some(slot) = stmt.args.get_mut(param_index as usize) else {
            return;
        };
        match slot {
            ArgSlot::Unset => *slot = ArgSlot::Bound(ArgValue::Bytes(Bytes::copy_from_slice(data))),
            ArgSlot::Bound(ArgValue::Bytes(existing)) => {
                let mut appended = existing.to_vec();
                appended.extend_from_slice(data);
                *slot = ArgSlot::Bound(ArgValue::Bytes(Bytes::from(appended)));
            }
            ArgSlot::Bound(_) => {}
        }
    }

    /// COM_STMT_RESET (spec.md §4.4): replace every slot with a fresh
    /// unset vector, regardless of what SEND_LONG_DATA had accumulated
    /// (Open Question in spec.md §9, decided: reset always wins).
    pub fn reset(&mut self, stmt_id: u32) {
        let Some(stmt) = self.statements.get_mut(&stmt_id) else {
            return;
        };
        stmt.args = vec![ArgSlot::Unset; stmt.num_params as usize];
    }

    /// Bind a COM_STMT_EXECUTE payload (the bytes after the command byte
    /// and the `stmt_id` the caller already parsed out of it) into
    /// `stmt_id`'s argument slots, per spec.md §4.4's layout. Returns
    /// the list of per-parameter bind errors, if any (never fatal: a
    /// partially-bound statement is still rendered, with placeholders for
    /// the failed slots).
    pub fn execute(&mut self, stmt_id: u32, payload: &[u8]) -> Option<Vec<BindError>> {
        let stmt = self.statements.get_mut(&stmt_id)?;
        let mut errors = Vec::new();

        // flags (1 byte, ignored) + iteration_count (4 bytes, ignored)
        let Some((_flags, rest)) = read_int_1(payload) else {
            return Some(errors);
        };
        let Some((_iteration_count, mut rest)) = read_int_4(rest) else {
            return Some(errors);
        };

        if stmt.num_params == 0 {
            return Some(errors);
        }

        let bitmap_len = (stmt.num_params as usize).div_ceil(8);
        let Some(bitmap_bytes) = rest.get(..bitmap_len) else {
            return Some(errors);
        };
        let null_bitmap = NullBitmap(bitmap_bytes);
        rest = &rest[bitmap_len..];

        let Some((new_params_bound_flag, mut rest)) = read_int_1(rest) else {
            return Some(errors);
        };

        if new_params_bound_flag != 1 {
            // Types weren't resent: whatever was bound (or long-data'd)
            // before stands, except parameters the bitmap now marks null —
            // and even then, a long-data slot keeps its accumulated bytes
            // rather than being overridden (spec.md §4.4: "overrides it
            // only if the execute provides a non-null value").
            for i in 0..stmt.num_params as usize {
                if null_bitmap.is_null(i) && !stmt.args[i].is_bytes() {
                    stmt.args[i] = ArgSlot::Bound(ArgValue::Null);
                }
            }
            return Some(errors);
        }

        let mut types = Vec::with_capacity(stmt.num_params as usize);
        for _ in 0..stmt.num_params {
            let Some((type_code, r)) = read_int_1(rest) else {
                return Some(errors);
            };
            let Some((flag_byte, r)) = read_int_1(r) else {
                return Some(errors);
            };
            types.push((type_code, flag_byte));
            rest = r;
        }

        for (i, (type_code, flag_byte)) in types.into_iter().enumerate() {
            if null_bitmap.is_null(i) {
                // Null in the bitmap never overrides an existing long-data
                // binding (spec.md §4.4); only clear the slot to NULL when
                // it wasn't already a byte string from SEND_LONG_DATA.
                if !stmt.args[i].is_bytes() {
                    stmt.args[i] = ArgSlot::Bound(ArgValue::Null);
                }
                continue;
            }

            let unsigned = value::is_unsigned_flag(flag_byte);
            match value::parse_param(type_code, unsigned, rest) {
                Ok((value, remaining)) => {
                    stmt.args[i] = ArgSlot::Bound(value);
                    rest = remaining;
                }
                Err(err) => {
                    stmt.args[i] = ArgSlot::Errored(err.to_string());
                    errors.push(BindError {
                        param_index: i,
                        reason: err.to_string(),
                    });
                }
            }
        }

        Some(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec_payload(stmt_id: u32, bitmap: &[u8], new_bound: u8, types: &[(u8, u8)], values: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&stmt_id.to_le_bytes());
        out.push(0); // flags
        out.extend_from_slice(&1u32.to_le_bytes()); // iteration_count
        out.extend_from_slice(bitmap);
        out.push(new_bound);
        if new_bound == 1 {
            for (t, f) in types {
                out.push(*t);
                out.push(*f);
            }
        }
        out.extend_from_slice(values);
        out
    }

    #[test]
    fn prepare_then_execute_int_and_string() {
        let mut store = StatementStore::new();
        store.prepare(1, Bytes::from_static(b"insert into t values( ?, ? )"), 0, 2);

        let mut values = Vec::new();
        values.extend_from_slice(&1024i32.to_le_bytes());
        values.push(4);
        values.extend_from_slice(b"1024");

        let payload = exec_payload(1, &[0x00], 1, &[(0x03, 0x00), (0xFD, 0x00)], &values);
        let errors = store.execute(1, &payload[4..]).unwrap();
        assert!(errors.is_empty());

        let stmt = store.get(1).unwrap();
        assert_eq!(stmt.args[0], ArgSlot::Bound(ArgValue::SignedInt(1024)));
        assert_eq!(
            stmt.args[1],
            ArgSlot::Bound(ArgValue::Bytes(Bytes::from_static(b"1024")))
        );
    }

    #[test]
    fn execute_with_both_null() {
        let mut store = StatementStore::new();
        store.prepare(1, Bytes::from_static(b"insert into t values( ?, ? )"), 0, 2);

        let payload = exec_payload(1, &[0x03], 1, &[(0x03, 0x00), (0xFD, 0x00)], &[]);
        let errors = store.execute(1, &payload[4..]).unwrap();
        assert!(errors.is_empty());

        let stmt = store.get(1).unwrap();
        assert_eq!(stmt.args[0], ArgSlot::Bound(ArgValue::Null));
        assert_eq!(stmt.args[1], ArgSlot::Bound(ArgValue::Null));
    }

    #[test]
    fn long_data_then_execute_then_reset() {
        let mut store = StatementStore::new();
        store.prepare(1, Bytes::from_static(b"select ? ;"), 0, 1);

        store.send_long_data(1, 0, b"hello ");
        store.send_long_data(1, 0, b"world");
        assert_eq!(
            store.get(1).unwrap().args[0],
            ArgSlot::Bound(ArgValue::Bytes(Bytes::from_static(b"hello world")))
        );

        let payload = exec_payload(1, &[0x01], 0, &[], &[]);
        store.execute(1, &payload[4..]).unwrap();
        assert_eq!(
            store.get(1).unwrap().args[0],
            ArgSlot::Bound(ArgValue::Bytes(Bytes::from_static(b"hello world")))
        );

        store.reset(1);
        assert_eq!(store.get(1).unwrap().args[0], ArgSlot::Unset);
    }

    #[test]
    fn long_data_survives_null_bit_even_with_types_resent() {
        let mut store = StatementStore::new();
        store.prepare(1, Bytes::from_static(b"select ?, ?"), 0, 2);
        store.send_long_data(1, 0, b"kept");

        // new_params_bound_flag = 1, slot 0 marked null in the bitmap: the
        // long-data bytes must still win (spec.md §4.4's override rule).
        let payload = exec_payload(1, &[0x01], 1, &[(0x03, 0x00), (0x03, 0x00)], &100i32.to_le_bytes());
        let errors = store.execute(1, &payload[4..]).unwrap();
        assert!(errors.is_empty());

        assert_eq!(
            store.get(1).unwrap().args[0],
            ArgSlot::Bound(ArgValue::Bytes(Bytes::from_static(b"kept")))
        );
        assert_eq!(store.get(1).unwrap().args[1], ArgSlot::Bound(ArgValue::SignedInt(100)));
    }

    #[test]
    fn unknown_statement_id_is_ignored() {
        let mut store = StatementStore::new();
        assert!(store.execute(42, &[]).is_none());
        store.send_long_data(42, 0, b"x"); // must not panic
        store.reset(42); // must not panic
    }

    #[test]
    fn send_long_data_out_of_range_index_is_dropped() {
        let mut store = StatementStore::new();
        store.prepare(1, Bytes::from_static(b"select ?"), 0, 1);
        store.send_long_data(1, 5, b"x");
        assert_eq!(store.get(1).unwrap().args[0], ArgSlot::Unset);
    }

    #[test]
    fn close_forgets_statement() {
        let mut store = StatementStore::new();
        store.prepare(1, Bytes::from_static(b"select 1"), 0, 0);
        store.close(1);
        assert!(store.get(1).is_none());
    }
}

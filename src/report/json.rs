//! JSON output for tick reports, listings and verify results.
//!
//! Serializes with serde for scripting and piping.

use serde::Serialize;

use crate::error::Result;

pub fn render<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::SnapshotRow;
    use crate::store::{Snapshot, SnapshotStatus};

    #[test]
    fn snapshot_row_is_flattened() {
        let row = SnapshotRow {
            snapshot: Snapshot {
                id: 3,
                filename: "2024-05-17.000".to_string(),
                created_at: 1_715_953_509,
                status: SnapshotStatus::Created,
            },
            tiers: vec!["daily".to_string()],
        };

        let value: serde_json::Value = serde_json::from_str(&render(&[row]).unwrap()).unwrap();
        assert_eq!(value[0]["id"], 3);
        assert_eq!(value[0]["filename"], "2024-05-17.000");
        assert_eq!(value[0]["status"], "created");
        assert_eq!(value[0]["tiers"][0], "daily");
    }
}

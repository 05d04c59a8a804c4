use serde::Serialize;

pub fn render_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::AssignmentSnapshot;

    #[test]
    fn empty_snapshot_renders_all_fields() {
        let out = render_json(&AssignmentSnapshot::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        for field in ["total", "finalized", "drafts", "unclaimed", "runs", "submissions"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert!(value["sent_deadline_message"].is_null());
    }
}

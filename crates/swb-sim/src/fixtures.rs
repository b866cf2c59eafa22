//! Checked-in capability documents for tests and demos

/// The `basic` pipeline: an `ipv4_lpm` table, a ternary/range `acl` table,
/// a selector profile, counters, a meter, a register, a digest, a value set
/// and packet I/O metadata.
pub fn basic_schema_json() -> &'static str {
    include_str!("../schemas/basic.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_schema_is_valid_json() {
        let value: serde_json::Value = serde_json::from_str(basic_schema_json()).unwrap();
        assert!(value["tables"].as_array().is_some());
    }
}

pub mod time;

/// Generates a random record id.
pub fn longid() -> String {
    nanoid::nanoid!()
}

/// Generates a run id.
pub fn run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

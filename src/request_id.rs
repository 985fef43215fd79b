use uuid::Uuid;

/// Fresh identifier for one logical request, bound into its signature as `jti`.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

use crate::authz::EnhancedResource;

pub const NAME: &str = "User";

pub fn resource() -> EnhancedResource {
    EnhancedResource::new(NAME)
        .props(["name", "email", "provider", "provider_id"])
        .table("users")
}

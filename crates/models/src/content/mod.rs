pub mod aggregate;
pub mod executable;
pub mod forget;
pub mod post;
pub mod store;

pub use aggregate::AggregateContent;
pub use executable::{ExecutableContent, InstanceContent, ProgramContent, Volume};
pub use forget::ForgetContent;
pub use post::{BalancesPostContent, PostContent};
pub use store::StoreContent;

/// The parsed, typed content of a message -- one variant per `MessageType`.
/// The content handler crate dispatches on this enum's discriminant rather
/// than re-inspecting the raw envelope.
#[derive(Debug, Clone)]
pub enum Content {
    Aggregate(AggregateContent),
    Post(PostContent),
    Store(StoreContent),
    Program(ProgramContent),
    Instance(InstanceContent),
    Forget(ForgetContent),
}

impl Content {
    /// The address that owns this content, independent of variant. Used by
    /// the default `check_permissions` implementation (spec §4.4).
    pub fn address(&self) -> &str {
        match self {
            Content::Aggregate(c) => &c.address,
            Content::Post(c) => &c.address,
            Content::Store(c) => &c.address,
            Content::Program(c) => &c.address,
            Content::Instance(c) => &c.address,
            Content::Forget(c) => &c.address,
        }
    }

    pub fn time(&self) -> f64 {
        match self {
            Content::Aggregate(c) => c.time,
            Content::Post(c) => c.time,
            Content::Store(c) => c.time,
            Content::Program(c) => c.time,
            Content::Instance(c) => c.time,
            Content::Forget(c) => c.time,
        }
    }

    pub fn as_executable(&self) -> Option<&dyn ExecutableContent> {
        match self {
            Content::Program(c) => Some(c),
            Content::Instance(c) => Some(c),
            _ => None,
        }
    }
}

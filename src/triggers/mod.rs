mod http;

pub use http::{publish_event, PublishEventResponse};

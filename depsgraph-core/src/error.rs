//! Error types for the fallible boundary of the graph API.
//!
//! Most structural violations (unknown operation key passed to
//! [`get_operation`](crate::node::ComponentNode::get_operation), handles from
//! another graph) are programmer errors and panic. The variants here cover
//! lookups where the caller explicitly asked for a `Result`.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DepsgraphError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DepsgraphError {
    #[error("no ID node for data-block {0}")]
    UnknownId(String),
    #[error("ID {id} has no component {component}")]
    MissingComponent { id: String, component: String },
    #[error("component {component} has no operation {operation}")]
    MissingOperation { component: String, operation: String },
    #[error("component {component} has no {boundary} operation")]
    MissingBoundary {
        component: String,
        boundary: &'static str,
    },
    #[error("graph is not registered")]
    NotRegistered,
}

impl DepsgraphError {
    pub fn unknown_id<T: Into<String>>(name: T) -> Self {
        DepsgraphError::UnknownId(name.into())
    }

    pub fn missing_component<I: Into<String>, C: Into<String>>(id: I, component: C) -> Self {
        DepsgraphError::MissingComponent {
            id: id.into(),
            component: component.into(),
        }
    }

    pub fn missing_operation<C: Into<String>, O: Into<String>>(component: C, operation: O) -> Self {
        DepsgraphError::MissingOperation {
            component: component.into(),
            operation: operation.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_missing_piece() {
        let err = DepsgraphError::missing_component("OBCube", "Transform()");
        assert_eq!(err.to_string(), "ID OBCube has no component Transform()");

        let err = DepsgraphError::MissingBoundary {
            component: "Geometry()".into(),
            boundary: "entry",
        };
        assert_eq!(err.to_string(), "component Geometry() has no entry operation");
    }
}

//! Input contract produced by the ticket-resolution collaborator.
//!
//! Entity and relation types are closed enums: an unknown type name fails at
//! the deserialization boundary instead of being carried around as free text.

use super::{EntityKind, RelationKind};
use serde::{Deserialize, Serialize};

fn default_confidence() -> f64 {
    1.0
}

/// One entity extracted from a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub label: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

impl ExtractedEntity {
    #[must_use]
    pub fn new(kind: EntityKind, label: impl Into<String>, confidence: f64) -> Self {
        Self {
            kind,
            label: label.into(),
            confidence,
        }
    }
}

/// One relation extracted from a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRelation {
    pub source_label: String,
    pub source_type: EntityKind,
    pub target_label: String,
    pub target_type: EntityKind,
    pub relation_type: RelationKind,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

impl ExtractedRelation {
    #[must_use]
    pub fn new(
        source: (EntityKind, &str),
        relation: RelationKind,
        target: (EntityKind, &str),
        confidence: f64,
    ) -> Self {
        Self {
            source_label: source.1.to_string(),
            source_type: source.0,
            target_label: target.1.to_string(),
            target_type: target.0,
            relation_type: relation,
            confidence,
        }
    }
}

/// Everything learned from one resolved ticket.
///
/// The extraction lists are optional on the wire so that an absent list can
/// be reported as a validation failure rather than a decoding failure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningData {
    #[serde(default)]
    pub ticket_id: String,
    #[serde(default)]
    pub entities_extracted: Option<Vec<ExtractedEntity>>,
    #[serde(default)]
    pub relations_extracted: Option<Vec<ExtractedRelation>>,
}

impl LearningData {
    /// Start a payload with empty (present) extraction lists.
    #[must_use]
    pub fn new(ticket_id: impl Into<String>) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            entities_extracted: Some(Vec::new()),
            relations_extracted: Some(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_entity(mut self, kind: EntityKind, label: &str, confidence: f64) -> Self {
        self.entities_extracted
            .get_or_insert_with(Vec::new)
            .push(ExtractedEntity::new(kind, label, confidence));
        self
    }

    #[must_use]
    pub fn with_relation(
        mut self,
        source: (EntityKind, &str),
        relation: RelationKind,
        target: (EntityKind, &str),
        confidence: f64,
    ) -> Self {
        self.relations_extracted
            .get_or_insert_with(Vec::new)
            .push(ExtractedRelation::new(source, relation, target, confidence));
        self
    }
}

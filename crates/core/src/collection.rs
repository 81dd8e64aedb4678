use serde::{Deserialize, Serialize};

use crate::{ColumnKind, Dialect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    #[default]
    Base,
    Auth,
    View,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: CollectionKind,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub indexes: Vec<String>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: CollectionKind::Base,
            fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.indexes.push(index.into());
        self
    }

    #[must_use]
    pub fn is_view(&self) -> bool {
        self.kind == CollectionKind::View
    }

    #[must_use]
    pub fn field_by_id(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.id == id)
    }

    #[must_use]
    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl Field {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
        }
    }

    /// The conventional text primary key every record table starts with.
    #[must_use]
    pub fn primary_key(id: impl Into<String>) -> Self {
        Self::new(id, "id", FieldKind::Text { primary_key: true })
    }

    /// Fields without the multiplicity capability are single-valued.
    #[must_use]
    pub fn is_multiple(&self) -> bool {
        self.kind.multiplicity().unwrap_or(false)
    }

    #[must_use]
    pub fn column_kind(&self) -> ColumnKind {
        match &self.kind {
            FieldKind::Text { primary_key: true } => ColumnKind::PrimaryKey,
            FieldKind::Text { .. }
            | FieldKind::Email
            | FieldKind::Url
            | FieldKind::Editor
            | FieldKind::Date
            | FieldKind::AutoDate
            | FieldKind::Password => ColumnKind::Text,
            FieldKind::Number => ColumnKind::Number,
            FieldKind::Bool => ColumnKind::Bool,
            FieldKind::Json => ColumnKind::Json,
            FieldKind::Select { .. } | FieldKind::File { .. } | FieldKind::Relation { .. } => {
                if self.is_multiple() {
                    ColumnKind::JsonArray
                } else {
                    ColumnKind::Text
                }
            }
        }
    }

    #[must_use]
    pub fn column_type(&self, dialect: &dyn Dialect) -> String {
        dialect.column_definition(self.column_kind())
    }

    /// Whether the physical column holds a JSON document.
    #[must_use]
    pub fn stores_json(&self) -> bool {
        matches!(self.column_kind(), ColumnKind::Json | ColumnKind::JsonArray)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text {
        #[serde(default)]
        primary_key: bool,
    },
    Number,
    Bool,
    Email,
    Url,
    Editor,
    Date,
    #[serde(rename = "autodate")]
    AutoDate,
    Json,
    Password,
    Select {
        #[serde(default)]
        values: Vec<String>,
        #[serde(default)]
        max_select: u32,
    },
    File {
        #[serde(default)]
        max_select: u32,
    },
    Relation {
        collection_id: String,
        #[serde(default)]
        max_select: u32,
    },
}

impl FieldKind {
    #[must_use]
    pub fn text() -> Self {
        Self::Text { primary_key: false }
    }

    /// `None` for kinds that have no notion of single vs. multiple values.
    #[must_use]
    pub fn multiplicity(&self) -> Option<bool> {
        match self {
            Self::Select { max_select, .. }
            | Self::File { max_select }
            | Self::Relation { max_select, .. } => Some(*max_select > 1),
            _ => None,
        }
    }
}

//! Registration draft and the values collected during onboarding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Whether the account belongs to a person or a business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    Individual,
    Business,
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Individual => write!(f, "Individual"),
            Self::Business => write!(f, "Business"),
        }
    }
}

/// Postal address record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
}

/// Reference to a file already uploaded by the host's upload pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    /// Opaque id assigned by the upload service.
    pub id: String,
    /// Document category, e.g. "business_registration", "photo".
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// One showcased project in a portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioItem {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<DocumentRef>,
}

/// A single draft value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    AccountType(AccountType),
    Address(Address),
    Portfolio(Vec<PortfolioItem>),
    Document(DocumentRef),
}

impl FieldValue {
    /// Present but carrying nothing a user actually entered.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Portfolio(items) => items.is_empty(),
            Self::Document(doc) => doc.id.trim().is_empty(),
            Self::AccountType(_) | Self::Address(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<AccountType> for FieldValue {
    fn from(t: AccountType) -> Self {
        Self::AccountType(t)
    }
}

impl From<Address> for FieldValue {
    fn from(a: Address) -> Self {
        Self::Address(a)
    }
}

impl From<DocumentRef> for FieldValue {
    fn from(d: DocumentRef) -> Self {
        Self::Document(d)
    }
}

impl From<Vec<PortfolioItem>> for FieldValue {
    fn from(items: Vec<PortfolioItem>) -> Self {
        Self::Portfolio(items)
    }
}

/// The accumulating registration record, keyed by logical field name.
///
/// Also used as a partial patch for `enter_draft` and for field commits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileDraft {
    fields: BTreeMap<String, FieldValue>,
}

impl ProfileDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    pub fn account_type(&self) -> Option<AccountType> {
        match self.get(fields::ACCOUNT_TYPE) {
            Some(FieldValue::AccountType(t)) => Some(*t),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Last-write-wins merge of `patch` into this draft.
    pub fn merge(&mut self, patch: ProfileDraft) {
        self.fields.extend(patch.fields);
    }

    /// Copy of the fields named in `names` that are present in this draft.
    pub fn subset<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> ProfileDraft {
        let fields = names
            .into_iter()
            .filter_map(|name| self.fields.get(name).map(|v| (name.to_string(), v.clone())))
            .collect();
        ProfileDraft { fields }
    }
}

/// Logical field names shared by the graph, validator and gateway.
pub mod fields {
    pub const ACCOUNT_TYPE: &str = "accountType";
    pub const FULL_NAME: &str = "fullName";
    pub const PHONE: &str = "phone";
    pub const EMAIL: &str = "email";
    pub const AVATAR: &str = "avatar";
    pub const BUSINESS_NAME: &str = "businessName";
    pub const CONTACT_NAME: &str = "contactName";
    pub const WEBSITE: &str = "website";
    pub const TAX_ID: &str = "taxId";
    pub const PORTFOLIO: &str = "portfolio";
    pub const BIO: &str = "bio";
    pub const ADDRESS: &str = "address";
    pub const VERIFICATION_DOCUMENT: &str = "verificationDocument";
}

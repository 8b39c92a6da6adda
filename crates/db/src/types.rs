#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub id: String,
    pub rev: String,
    pub body: String,
    pub updated_at: String,
}

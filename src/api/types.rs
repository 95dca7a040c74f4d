use serde::{Deserialize, Serialize};

/// A single journal reflection as the server stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reflection {
  pub id: u64,
  /// Creation date as "YYYY-MM-DD" (assigned by the server).
  pub date: String,
  pub content: String,
}

/// Response document for the listing endpoint: `{"reflections": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReflectionsDoc {
  #[serde(default)]
  pub reflections: Vec<Reflection>,
}

/// Request body for creating a reflection.
#[derive(Debug, Clone, Serialize)]
pub struct NewReflection {
  pub content: String,
}

/// Error body the server returns on a rejected request: `{"error": "..."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
  pub error: String,
}

use serde::Deserialize;

/// A numeric field as submitted by clients: either a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumericInput {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentInput {
    pub name: Option<String>,
    pub avatar: Option<String>,
}

/// Body of listing create and update requests. Everything is optional here;
/// the service decides what is required for each operation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPayload {
    pub title: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub price: Option<NumericInput>,
    pub beds: Option<NumericInput>,
    pub baths: Option<NumericInput>,
    pub sqft: Option<NumericInput>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub images: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub agent: Option<AgentInput>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    pub q: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

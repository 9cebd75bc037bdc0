// Profile tool

use rmcp::model::Tool;
use serde_json::json;

use super::{tool, Access};
use crate::error::Result;
use crate::graph::GraphClient;

pub(crate) fn definitions() -> Vec<Tool> {
    vec![tool(
        "ms365_get_profile",
        "Get the authenticated user's Microsoft 365 profile.",
        json!({"type": "object", "properties": {}}),
        Access::ReadOnly,
    )]
}

pub async fn get_profile(graph: &GraphClient) -> Result<String> {
    let me = graph.get_me().await?;

    let email = me
        .mail
        .as_deref()
        .or(me.user_principal_name.as_deref())
        .unwrap_or("N/A");
    let phone = me
        .business_phones
        .as_ref()
        .and_then(|phones| phones.first())
        .map(String::as_str)
        .unwrap_or("N/A");

    let lines = [
        "**Your Microsoft 365 Profile:**\n".to_string(),
        format!("- **Name:** {}", me.display_name.as_deref().unwrap_or("N/A")),
        format!("- **Email:** {}", email),
        format!("- **Job Title:** {}", me.job_title.as_deref().unwrap_or("N/A")),
        format!("- **Office:** {}", me.office_location.as_deref().unwrap_or("N/A")),
        format!("- **Phone:** {}", phone),
    ];
    Ok(lines.join("\n"))
}

//! Shared slack-morphism client used by the chat and directory services.

use std::{future::Future, sync::Arc};

use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use slack_morphism::prelude::*;

use crate::base::types::Res;

// Type aliases.

pub type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

/// Page size requested from cursor-paginated list methods.
pub const PAGE_LIMIT: u16 = 200;

/// Builds the HTTPS Slack client shared by every service.
pub fn full_client() -> Res<Arc<FullClient>> {
    let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
    let connector = SlackClientHyperConnector::with_connector(https_connector);

    Ok(Arc::new(slack_morphism::SlackClient::new(connector)))
}

pub fn api_token(value: &str) -> SlackApiToken {
    SlackApiToken::new(SlackApiTokenValue(value.to_string()))
}

/// The cursor of the next page, if there is one.
pub fn next_cursor(metadata: Option<&SlackResponseMetadata>) -> Option<SlackCursorId> {
    metadata?.next_cursor.clone().filter(|cursor| !cursor.value().is_empty())
}

/// Fetches pages until the cursor runs out and concatenates their items.
///
/// `fetch` receives the cursor of the page to load (`None` for the first one)
/// and returns that page's items with its response metadata.
pub async fn paginate<T, F, Fut>(mut fetch: F) -> Res<Vec<T>>
where
    F: FnMut(Option<SlackCursorId>) -> Fut,
    Fut: Future<Output = Res<(Vec<T>, Option<SlackResponseMetadata>)>>,
{
    let mut items = Vec::new();
    let mut cursor = None;

    loop {
        let (page, metadata) = fetch(cursor).await?;
        items.extend(page);

        cursor = next_cursor(metadata.as_ref());
        if cursor.is_none() {
            break;
        }
    }

    Ok(items)
}

// SPDX-License-Identifier: Apache-2.0

//! Ads-draft generation: product facts in, channel-shaped copy out,
//! stored as Proposed for a human to review. Nothing is stored when the
//! model's answer is unusable.

use crate::error::{DraftError, DraftErrorCode};
use tracing::info;
use tradepost_gateways::{CopyModel, CopyPrompt};
use tradepost_model::{validate_tone, AdChannel, AdsDraft, DraftCopy, Product, ProductSlug};
use tradepost_store::Store;

const DRAFT_MAX_TOKENS: u32 = 600;

pub async fn generate_draft(
    store: &Store,
    model: &dyn CopyModel,
    slug: &ProductSlug,
    channel: AdChannel,
    tone: Option<&str>,
    now_ms: u64,
) -> Result<AdsDraft, DraftError> {
    if let Some(tone) = tone {
        validate_tone(tone).map_err(|e| DraftError::validation(format!("tone: {e}")))?;
    }
    let product = store
        .product_by_slug(slug)?
        .ok_or_else(|| DraftError::new(DraftErrorCode::NotFound, format!("product {slug}")))?;

    let prompt = build_prompt(&product, channel, tone);
    let raw = model
        .complete(&prompt)
        .await
        .map_err(|e| DraftError::new(DraftErrorCode::Gateway, e.to_string()))?;
    let copy = parse_copy(&raw)?
        .clamp_to_channel(channel)
        .map_err(|e| DraftError::decode(format!("model copy unusable after clamping: {e}")))?;

    let draft = store.insert_ads_draft(slug, channel, tone, &copy, model.model_name(), now_ms)?;
    info!(
        slug = %slug,
        channel = channel.as_str(),
        draft_id = draft.id,
        headlines = draft.copy.headlines.len(),
        "ads draft proposed"
    );
    Ok(draft)
}

fn build_prompt(product: &Product, channel: AdChannel, tone: Option<&str>) -> CopyPrompt {
    let system = format!(
        "You write ad copy for a small online shop. Respond with strict JSON only, \
         no markdown and no commentary, in exactly this shape: \
         {{\"headlines\": [{} string(s), each at most {} characters], \
         \"body_lines\": [{} string(s), each at most {} characters]}}.",
        channel.headline_count(),
        channel.headline_max(),
        channel.body_count(),
        channel.body_max(),
    );
    let price = format!(
        "{}.{:02} {}",
        product.price_cents / 100,
        product.price_cents % 100,
        product.currency.as_str()
    );
    let user = format!(
        "Channel: {}\nProduct: {}\nDescription: {}\nPrice: {}\nTone: {}\n",
        channel.as_str(),
        product.name,
        product.description,
        price,
        tone.unwrap_or("plain and direct"),
    );
    CopyPrompt {
        system,
        user,
        max_tokens: DRAFT_MAX_TOKENS,
    }
}

/// Models keep wrapping JSON in a fence no matter what the prompt says,
/// so a single fenced block is accepted and unwrapped.
fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim();
        }
    }
    trimmed
}

fn parse_copy(raw: &str) -> Result<DraftCopy, DraftError> {
    serde_json::from_str::<DraftCopy>(extract_json(raw))
        .map_err(|e| DraftError::decode(format!("model output is not draft json: {e}")))
}

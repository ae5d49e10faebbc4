/*!
 * Marker framing for batch prompts.
 *
 * A batch travels to a model as one prompt with each unit fenced by
 * `<<UNIT_i>>` markers and a closing `<<END>>`. The response is re-split on
 * the same markers, which is how index alignment survives a free-form text
 * model: a response with missing, duplicated, or out-of-order markers cannot
 * be aligned and is rejected as malformed.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::ProviderError;

/// Closing marker appended after the last unit
pub const END_MARKER: &str = "<<END>>";

static UNIT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<<UNIT_(\d+)>>").expect("static marker pattern"));

/// System prompt shared by all chat-style backends
pub fn system_prompt(source_lang: &str, target_lang: &str) -> String {
    format!(
        "You are a professional document translator. Translate the following text \
         from {source_lang} to {target_lang}. The text is split into segments fenced \
         by <<UNIT_n>> markers. Translate each segment independently, keep every \
         marker exactly as it appears, keep the segment order, and finish with \
         {END_MARKER}. Return nothing but the markers and the translations."
    )
}

/// Frame the batch texts into a single prompt body
pub fn frame(texts: &[String]) -> String {
    let mut body = String::new();
    for (i, text) in texts.iter().enumerate() {
        body.push_str(&format!("<<UNIT_{i}>>\n"));
        body.push_str(text);
        body.push('\n');
    }
    body.push_str(END_MARKER);
    body
}

/// Split a model response back into per-unit translations.
///
/// Requires exactly the markers `<<UNIT_0>>..<<UNIT_{n-1}>>` in order plus
/// the closing marker; anything else is a malformed response.
pub fn split(response: &str, expected: usize) -> Result<Vec<String>, ProviderError> {
    let mut markers: Vec<(usize, usize, usize)> = Vec::new(); // (unit index, start, end)
    for caps in UNIT_MARKER.captures_iter(response) {
        let whole = caps.get(0).expect("regex match has group 0");
        let index: usize = caps[1]
            .parse()
            .map_err(|_| ProviderError::MalformedResponse("unparseable unit marker".into()))?;
        markers.push((index, whole.start(), whole.end()));
    }

    if markers.len() != expected {
        return Err(ProviderError::MalformedResponse(format!(
            "expected {} unit markers, found {}",
            expected,
            markers.len()
        )));
    }
    for (i, (index, _, _)) in markers.iter().enumerate() {
        if *index != i {
            return Err(ProviderError::MalformedResponse(format!(
                "unit markers out of order: found {} at position {}",
                index, i
            )));
        }
    }

    let end_pos = response.rfind(END_MARKER).ok_or_else(|| {
        ProviderError::MalformedResponse("response missing end marker".to_string())
    })?;

    let mut segments = Vec::with_capacity(expected);
    for (i, (_, _, body_start)) in markers.iter().enumerate() {
        let body_end = if i + 1 < markers.len() {
            markers[i + 1].1
        } else {
            end_pos
        };
        if body_end < *body_start {
            return Err(ProviderError::MalformedResponse(
                "end marker precedes last unit marker".to_string(),
            ));
        }
        segments.push(response[*body_start..body_end].trim().to_string());
    }

    Ok(segments)
}

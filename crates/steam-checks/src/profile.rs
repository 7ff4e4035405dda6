//! Pass predicates for the profile-asset checks
//!
//! The account service wraps payloads in a `response` envelope; predicates
//! look through it so bare payloads (older responses, test fixtures) also
//! evaluate.

use serde_json::Value;

use common::CheckName;

use crate::Verdict;

/// Evaluate a profile-asset check against a response body.
pub(crate) fn evaluate(check: CheckName, body: &Value) -> Verdict {
    let node = body.get("response").unwrap_or(body);
    match check {
        CheckName::AnimatedAvatar => asset_verdict(node, "avatar"),
        CheckName::AvatarFrame => asset_verdict(node, "avatar_frame"),
        CheckName::MiniProfileBackground | CheckName::ProfileBackground => {
            asset_verdict(node, "profile_background")
        }
        CheckName::SteamLevel => match node.get("player_level").and_then(Value::as_i64) {
            // An empty response means the profile hides its level: pass, and
            // let the worker skip the rate-limited checks.
            None => Verdict::private_pass(),
            Some(level) if level <= 13 => Verdict::pass(),
            Some(level) => Verdict::fail(format!("level {level}")),
        },
        CheckName::Friends | CheckName::CsgoInventory => {
            unreachable!("rate-limited checks are not profile-asset checks")
        }
    }
}

/// Pass when the field is absent or empty; anything substantive fails.
fn asset_verdict(node: &Value, field: &str) -> Verdict {
    if field_absent_or_empty(node, field) {
        Verdict::pass()
    } else {
        Verdict::fail(format!("{field} present"))
    }
}

fn field_absent_or_empty(node: &Value, field: &str) -> bool {
    match node.get(field) {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_or_empty_avatar_passes() {
        for body in [
            json!({}),
            json!({"response": {}}),
            json!({"response": {"avatar": null}}),
            json!({"response": {"avatar": {}}}),
            json!({"response": {"avatar": ""}}),
            json!({"avatar": []}),
        ] {
            let verdict = evaluate(CheckName::AnimatedAvatar, &body);
            assert!(verdict.passed, "body: {body}");
        }
    }

    #[test]
    fn present_avatar_fails() {
        let body = json!({"response": {"avatar": {"image_small": "anim.webm"}}});
        let verdict = evaluate(CheckName::AnimatedAvatar, &body);
        assert!(!verdict.passed);
        assert_eq!(verdict.reason.as_deref(), Some("avatar present"));
    }

    #[test]
    fn frame_and_backgrounds_use_their_fields() {
        let framed = json!({"response": {"avatar_frame": {"image_small": "frame.png"}}});
        assert!(!evaluate(CheckName::AvatarFrame, &framed).passed);
        assert!(evaluate(CheckName::ProfileBackground, &framed).passed);

        let background = json!({"response": {"profile_background": {"image_large": "bg.jpg"}}});
        assert!(!evaluate(CheckName::ProfileBackground, &background).passed);
        assert!(!evaluate(CheckName::MiniProfileBackground, &background).passed);
        assert!(evaluate(CheckName::AvatarFrame, &background).passed);
    }

    #[test]
    fn low_level_passes_high_level_fails() {
        let low = json!({"response": {"player_level": 13}});
        let verdict = evaluate(CheckName::SteamLevel, &low);
        assert!(verdict.passed);
        assert!(!verdict.private_profile);

        let high = json!({"response": {"player_level": 14}});
        let verdict = evaluate(CheckName::SteamLevel, &high);
        assert!(!verdict.passed);
        assert_eq!(verdict.reason.as_deref(), Some("level 14"));
    }

    #[test]
    fn empty_level_response_is_a_private_pass() {
        for body in [json!({}), json!({"response": {}})] {
            let verdict = evaluate(CheckName::SteamLevel, &body);
            assert!(verdict.passed, "body: {body}");
            assert!(verdict.private_profile, "body: {body}");
        }
    }
}

use serde_json::Value;
use tracing::debug;

use crate::users::{upsize_avatar, RelationshipStatus, UserRecord};

/// Where the instruction list has lived across revisions of the following
/// timeline response, newest first.
const INSTRUCTION_PATHS: &[&str] = &[
    "/data/user/result/timeline/timeline/instructions",
    "/data/user/result/timeline_v2/timeline/instructions",
    "/data/user/result/timeline/instructions",
];

const USER_RESULT_PATHS: &[&str] = &[
    "/itemContent/user_results/result",
    "/itemContent/user_result/result",
];

const ID_PATHS: &[&str] = &["/rest_id", "/id"];
const SCREEN_NAME_PATHS: &[&str] = &["/core/screen_name", "/legacy/screen_name"];
const NAME_PATHS: &[&str] = &["/core/name", "/legacy/name"];
const AVATAR_PATHS: &[&str] = &[
    "/avatar/image_url",
    "/legacy/profile_image_url_https",
    "/legacy/profile_image_url",
];
const FOLLOWED_BY_PATHS: &[&str] = &[
    "/relationship_perspectives/followed_by",
    "/legacy/followed_by",
];
const DESCRIPTION_PATHS: &[&str] = &["/profile_bio/description", "/legacy/description"];

/// Maps one intercepted list response to user records.
///
/// Unknown shapes yield an empty list. Entries that do not resolve to both an
/// id and a screen name are skipped.
pub fn extract_users(payload: &Value) -> Vec<UserRecord> {
    let Some(instructions) = first_array(payload, INSTRUCTION_PATHS) else {
        debug!("payload carries no instruction list");
        return Vec::new();
    };

    let mut users = Vec::new();
    for instruction in instructions {
        for item in item_containers(instruction) {
            match user_result(item).and_then(to_record) {
                Some(record) => users.push(record),
                None => {
                    let entry_id = item.get("entryId").and_then(Value::as_str).unwrap_or("");
                    debug!(entry_id, "skipping timeline entry without a usable user");
                }
            }
        }
    }
    users
}

/// Every object in an instruction that may carry an `itemContent`: plain
/// entries, items nested in module entries, and `moduleItems`.
fn item_containers(instruction: &Value) -> Vec<&Value> {
    let mut items = Vec::new();
    for entry in array_at(instruction, "/entries") {
        let Some(content) = entry.get("content") else {
            continue;
        };
        if content.get("itemContent").is_some() {
            items.push(content);
        }
        items.extend(
            array_at(content, "/items")
                .iter()
                .filter_map(|module_item| module_item.get("item")),
        );
    }
    items.extend(
        array_at(instruction, "/moduleItems")
            .iter()
            .filter_map(|module_item| module_item.get("item")),
    );
    items
}

fn user_result(item: &Value) -> Option<&Value> {
    let result = USER_RESULT_PATHS
        .iter()
        .find_map(|path| item.pointer(path))?;
    match result.get("__typename").and_then(Value::as_str) {
        Some("UserUnavailable") => None,
        Some("UserWithVisibilityResults") => result.get("user"),
        _ => Some(result),
    }
}

fn to_record(result: &Value) -> Option<UserRecord> {
    let id = first_str(result, ID_PATHS)?;
    let screen_name = first_str(result, SCREEN_NAME_PATHS)?;
    let is_following_you = first_bool(result, FOLLOWED_BY_PATHS);

    Some(UserRecord {
        id: id.to_string(),
        screen_name: screen_name.to_string(),
        name: first_str(result, NAME_PATHS).unwrap_or_default().to_string(),
        avatar: first_str(result, AVATAR_PATHS)
            .map(upsize_avatar)
            .unwrap_or_default(),
        followers_count: Some(count(result, "/legacy/followers_count")),
        following_count: Some(count(result, "/legacy/friends_count")),
        statuses_count: Some(count(result, "/legacy/statuses_count")),
        is_following_you,
        is_blue_verified: result
            .get("is_blue_verified")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        description: first_str(result, DESCRIPTION_PATHS)
            .unwrap_or_default()
            .to_string(),
        status: RelationshipStatus::from_followed_by(is_following_you),
        incomplete: false,
    })
}

fn first_array<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Vec<Value>> {
    paths
        .iter()
        .find_map(|path| value.pointer(path).and_then(Value::as_array))
}

fn array_at<'a>(value: &'a Value, path: &str) -> &'a [Value] {
    value
        .pointer(path)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// First non-empty string among `paths`.
fn first_str<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a str> {
    paths.iter().find_map(|path| {
        value
            .pointer(path)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    })
}

fn first_bool(value: &Value, paths: &[&str]) -> bool {
    paths
        .iter()
        .find_map(|path| value.pointer(path).and_then(Value::as_bool))
        .unwrap_or(false)
}

fn count(value: &Value, path: &str) -> u64 {
    value.pointer(path).and_then(Value::as_u64).unwrap_or(0)
}

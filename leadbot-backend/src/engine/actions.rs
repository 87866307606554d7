//! Callback payloads the engine recognizes. These strings travel inside
//! inline-button callback_data and are part of the deployed button surface;
//! changing them orphans buttons in already-sent messages.

pub const MENU_MATERIALS: &str = "menu_materials";
pub const MENU_CONSULTATION: &str = "menu_consultation";
pub const BACK_MAIN_MENU: &str = "back_main_menu";
pub const BACK_MATERIALS_LIST: &str = "back_materials_list";
pub const CONSULTATION_START: &str = "consultation_start";
pub const CONSULTATION_SKIP_DESCRIPTION: &str = "consultation_skip_description";
pub const CHECK_SUBSCRIPTION: &str = "check_subscription";

pub const MATERIAL_CATEGORY_PREFIX: &str = "material_category_";
pub const MATERIAL_DOWNLOAD_PREFIX: &str = "material_download_";

/// Numeric suffix of a prefixed callback, e.g. `material_category_12` -> 12.
pub fn parse_id_suffix(data: &str, prefix: &str) -> Option<i64> {
    data.strip_prefix(prefix)?.parse().ok()
}

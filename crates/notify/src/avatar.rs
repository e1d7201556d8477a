//! HTML avatar fragments for email descriptions.

use fanout_core::{AvatarType, User};
use sha2::{Digest, Sha256};

use crate::description::escape_html;
use crate::links::LinkBuilder;

const AVATAR_SIZE: u32 = 20;

const LETTER_AVATAR_COLORS: [&str; 12] = [
    "#4674ca", "#315cac", "#57be8c", "#3fa372", "#f9a66d", "#ec5e44", "#e63717", "#f868bc",
    "#6c5fc7", "#4e3fb4", "#57b1be", "#847a8c",
];

/// Avatar markup for the activity's actor (`None` = system activity).
pub fn avatar_markup(actor: Option<&User>, links: &LinkBuilder) -> String {
    let Some(user) = actor else {
        return format!(
            r#"<img class="avatar" src="{}" width="{AVATAR_SIZE}px" height="{AVATAR_SIZE}px" />"#,
            escape_html(&links.system_avatar_url())
        );
    };

    match user.avatar_type() {
        AvatarType::Upload => {
            let ident = user.avatar.as_ref().and_then(|a| a.ident.as_deref());
            format!(
                r#"<img class="avatar" src="{}" />"#,
                escape_html(&links.user_avatar_url(ident, Some(AVATAR_SIZE)))
            )
        }
        AvatarType::Letter => letter_avatar(user.display_name(), &user.label(), AVATAR_SIZE),
        AvatarType::Gravatar => identicon_avatar(&user.label(), AVATAR_SIZE),
    }
}

/// Coloured monogram; the colour is a pure function of `identifier`.
fn letter_avatar(display_name: &str, identifier: &str, size: u32) -> String {
    let style = format!(
        "background-color: {}; height: {size}px; width: {size}px; line-height: {size}px; font-size: {}px;",
        letter_avatar_color(identifier),
        size * 45 / 100
    );
    format!(
        r#"<span class="html-avatar" style="{}">{}</span>"#,
        escape_html(&style),
        escape_html(&initials(display_name))
    )
}

fn identicon_avatar(identifier: &str, size: u32) -> String {
    let digest = Sha256::digest(identifier.trim().to_lowercase().as_bytes());
    let url = format!("https://secure.gravatar.com/avatar/{digest:x}?s={size}&d=identicon");
    format!(
        r#"<img class="avatar" src="{}" width="{size}px" height="{size}px" />"#,
        escape_html(&url)
    )
}

fn letter_avatar_color(identifier: &str) -> &'static str {
    let digest = Sha256::digest(identifier.as_bytes());
    let index = u16::from_be_bytes([digest[0], digest[1]]) as usize;
    LETTER_AVATAR_COLORS[index % LETTER_AVATAR_COLORS.len()]
}

fn initials(display_name: &str) -> String {
    let words: Vec<&str> = display_name.split_whitespace().collect();
    let first = |w: &str| w.chars().next().map(|c| c.to_uppercase().to_string());
    match words.as_slice() {
        [] => "?".to_string(),
        [only] => first(*only).unwrap_or_default(),
        [head, .., last] => format!(
            "{}{}",
            first(*head).unwrap_or_default(),
            first(*last).unwrap_or_default()
        ),
    }
}

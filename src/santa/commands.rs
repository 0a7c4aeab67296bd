//! Slash commands understood by the bot.

use teloxide::utils::command::BotCommands;

use crate::santa::assignment::ParticipantId;

/// Commands parsed from private messages.
///
/// Admin commands are hidden from the menu Telegram shows to everyone.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "snake_case", description = "Secret Santa commands:")]
pub enum Command {
    #[command(description = "register for the Secret Santa game.")]
    Start,
    #[command(description = "set or replace your wish list.")]
    Wishlist(String),
    #[command(description = "add a line to your wish list.")]
    WishlistAdd(String),
    #[command(description = "show your own wish list.")]
    MyWishlist,
    #[command(description = "view your recipient's wish list.")]
    ViewWishlist,
    #[command(description = "cancel a pending wish list edit.")]
    Cancel,
    #[command(description = "show the help message.")]
    Help,
    #[command(hide)]
    InitiateDraw,
    #[command(hide)]
    ReassignAlias(String),
    #[command(hide)]
    RemindAll(String),
    #[command(hide)]
    Status,
}

/// Help text; admin commands are listed only for the admin.
pub fn help_text(is_admin: bool) -> String {
    let mut lines = vec![
        "Welcome to the Secret Santa Bot!",
        "",
        "Available commands:",
        "/start - Register for the Secret Santa game.",
        "/wishlist <your wish list> - Set or update your wish list.",
        "/wishlist_add <item> - Add a line to your wish list.",
        "/my_wishlist - Show your own wish list.",
        "/view_wishlist - View your recipient's wish list (after the draw).",
        "/cancel - Cancel a pending wish list edit.",
        "/help - Show this help message.",
    ];
    if is_admin {
        lines.extend([
            "",
            "Admin commands:",
            "/initiate_draw - Run the draw and notify every Secret Santa.",
            "/reassign_alias <user_id> [alias] - Give a participant a new code name.",
            "/remind_all [text] - Send every participant a reminder.",
            "/status - Show registration and draw status.",
        ]);
    }
    lines.join("\n")
}

/// Parse `/reassign_alias` arguments: a user id, optionally followed by an alias.
pub fn parse_reassign_args(args: &str) -> Result<(ParticipantId, Option<String>), String> {
    let args = args.trim();
    let (id, alias) = match args.split_once(char::is_whitespace) {
        Some((id, alias)) => (id, Some(alias.trim().to_string())),
        None => (args, None),
    };

    if id.is_empty() {
        return Err("Usage: /reassign_alias <user_id> [alias]".to_string());
    }
    let id = id
        .parse::<ParticipantId>()
        .map_err(|_| format!("'{id}' is not a valid user id."))?;

    Ok((id, alias.filter(|a| !a.is_empty())))
}

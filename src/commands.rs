//! Chat Commands
//!
//! Messages starting with `!` are routed here, whether they arrive in
//! a channel or as a DM to the bot. Commands carry a privilege gate;
//! anything unknown or unauthorized answers the same way so command
//! names never leak.

use rand::Rng;

use crate::constants::privileges::Privileges;
use crate::handler::Ctx;

type CommandHandler = fn(&mut Ctx<'_>, i32, &[&str]) -> String;

struct Command {
    name: &'static str,
    aliases: &'static [&'static str],
    privileges: Privileges,
    handler: CommandHandler,
}

const COMMANDS: &[Command] = &[
    Command {
        name: "!help",
        aliases: &["!h"],
        privileges: Privileges::VERIFIED,
        handler: help,
    },
    Command {
        name: "!roll",
        aliases: &[],
        privileges: Privileges::VERIFIED,
        handler: roll,
    },
    Command {
        name: "!stealth",
        aliases: &[],
        privileges: Privileges::STAFF,
        handler: stealth,
    },
];

/// Run a `!` message; `None` when it isn't a command at all.
pub fn dispatch(ctx: &mut Ctx<'_>, user_id: i32, message: &str) -> Option<String> {
    if !message.starts_with('!') {
        return None;
    }

    let mut parts = message.split_whitespace();
    let name = parts.next()?;
    let args: Vec<&str> = parts.collect();

    let privileges = ctx.sessions.users.get(user_id)?.privileges;

    for command in COMMANDS {
        if command.name != name && !command.aliases.contains(&name) {
            continue;
        }
        if !privileges.intersects(command.privileges) {
            break;
        }

        return Some((command.handler)(ctx, user_id, &args));
    }

    Some("Command not found!".to_string())
}

fn help(ctx: &mut Ctx<'_>, user_id: i32, _args: &[&str]) -> String {
    let privileges = ctx
        .sessions
        .users
        .get(user_id)
        .map(|user| user.privileges)
        .unwrap_or_default();

    let available: Vec<&str> = COMMANDS
        .iter()
        .filter(|command| privileges.intersects(command.privileges))
        .map(|command| command.name)
        .collect();

    format!("Available commands: {}", available.join(", "))
}

fn roll(ctx: &mut Ctx<'_>, user_id: i32, args: &[&str]) -> String {
    let max: u32 = args
        .first()
        .and_then(|arg| arg.parse().ok())
        .filter(|max| *max > 0)
        .unwrap_or(100);

    let points = rand::thread_rng().gen_range(0..=max);
    let name = ctx
        .sessions
        .users
        .get(user_id)
        .map(|user| user.name.clone())
        .unwrap_or_default();

    format!("{name} rolls {points} points!")
}

fn stealth(ctx: &mut Ctx<'_>, user_id: i32, _args: &[&str]) -> String {
    let Some(user) = ctx.sessions.users.get_mut(user_id) else {
        return "Command not found!".to_string();
    };

    user.stealth = !user.stealth;
    if user.stealth {
        "Stealth mode enabled.".to_string()
    } else {
        "Stealth mode disabled.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testing::fixture;
    use crate::handler::Ctx;

    fn ctx_dispatch(message: &str, staff: bool) -> Option<String> {
        let (mut sessions, services, config) = fixture(&[1]);
        if staff {
            sessions.users.get_mut(1).unwrap().privileges |= Privileges::ADMIN;
        }

        let mut ctx = Ctx {
            sessions: &mut sessions,
            services: &services,
            config: &config,
            now: 0,
        };
        dispatch(&mut ctx, 1, message)
    }

    #[test]
    fn non_command_is_none() {
        assert!(ctx_dispatch("hello", false).is_none());
    }

    #[test]
    fn unknown_command_answers_uniformly() {
        assert_eq!(ctx_dispatch("!missing", false).unwrap(), "Command not found!");
        // staff-only command looks the same to a normal user
        assert_eq!(ctx_dispatch("!stealth", false).unwrap(), "Command not found!");
    }

    #[test]
    fn roll_respects_bounds() {
        for _ in 0..20 {
            let reply = ctx_dispatch("!roll 5", false).unwrap();
            let points: u32 = reply
                .split_whitespace()
                .nth(2)
                .and_then(|v| v.parse().ok())
                .unwrap();
            assert!(points <= 5);
        }
    }

    #[test]
    fn stealth_toggles_for_staff() {
        let (mut sessions, services, config) = fixture(&[1]);
        sessions.users.get_mut(1).unwrap().privileges |= Privileges::ADMIN;

        let mut ctx = Ctx {
            sessions: &mut sessions,
            services: &services,
            config: &config,
            now: 0,
        };
        assert_eq!(dispatch(&mut ctx, 1, "!stealth").unwrap(), "Stealth mode enabled.");
        assert!(ctx.sessions.users.get(1).unwrap().stealth);
        assert_eq!(dispatch(&mut ctx, 1, "!stealth").unwrap(), "Stealth mode disabled.");
    }

    #[test]
    fn help_lists_by_privilege() {
        let normal = ctx_dispatch("!help", false).unwrap();
        assert!(normal.contains("!roll"));
        assert!(!normal.contains("!stealth"));

        let staff = ctx_dispatch("!help", true).unwrap();
        assert!(staff.contains("!stealth"));
    }
}

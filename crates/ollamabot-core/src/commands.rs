use crate::domain::UserId;

/// Why an `/adduser` argument could not be used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgError {
    Missing,
    NotInteger(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    WhoAmI,
    /// `None` reports the current model, `Some` switches to it.
    Model(Option<String>),
    AddUser(Result<UserId, ArgError>),
    ListUsers,
}

impl Command {
    /// Admin-only commands fall through to the query path for everyone else.
    pub fn is_admin_only(&self) -> bool {
        matches!(self, Command::AddUser(_) | Command::ListUsers)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Command(Command),
    Query,
}

/// Classify normalized (trimmed) message text.
///
/// Only the first whitespace-delimited token is matched, exactly and
/// case-insensitively. Anything unrecognized, including unknown `/commands`,
/// is a free-form query.
pub fn classify(text: &str) -> Route {
    let (name, args) = split_command(text);
    let Some(name) = name else {
        return Route::Query;
    };

    let cmd = match name.as_str() {
        "start" => Command::Start,
        "whoami" => Command::WhoAmI,
        "model" => Command::Model(args.first().map(|s| s.to_string())),
        "adduser" => Command::AddUser(parse_user_id(args.first().copied())),
        "listusers" => Command::ListUsers,
        _ => return Route::Query,
    };
    Route::Command(cmd)
}

fn split_command(text: &str) -> (Option<String>, Vec<&str>) {
    let mut tokens = text.split_whitespace();
    let Some(first) = tokens.next() else {
        return (None, Vec::new());
    };
    let Some(rest) = first.strip_prefix('/') else {
        return (None, Vec::new());
    };

    // Telegram may send `/cmd@botname` in groups.
    let name = rest.split('@').next().unwrap_or("").to_lowercase();
    if name.is_empty() {
        return (None, Vec::new());
    }
    (Some(name), tokens.collect())
}

fn parse_user_id(arg: Option<&str>) -> Result<UserId, ArgError> {
    let arg = arg.ok_or(ArgError::Missing)?;
    arg.parse::<i64>()
        .map(UserId)
        .map_err(|_| ArgError::NotInteger(arg.to_string()))
}

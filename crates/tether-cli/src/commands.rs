//! REPL slash commands.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Quit,
    Servers,
    Tools,
    Connect(String),
    Disconnect(String),
    Check(String),
    /// Show the current model, or switch to the named one.
    Model(Option<String>),
    /// A known command used without its required argument.
    Usage(&'static str),
    Unknown(String),
}

impl SlashCommand {
    /// Parse a line of input. Returns `None` for ordinary queries.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if !input.starts_with('/') {
            return None;
        }

        let (cmd, arg) = match input.split_once(char::is_whitespace) {
            Some((c, a)) => (c, Some(a.trim()).filter(|a| !a.is_empty())),
            None => (input, None),
        };

        let with_server = |usage: &'static str, make: fn(String) -> SlashCommand| match arg {
            Some(name) => make(name.to_string()),
            None => SlashCommand::Usage(usage),
        };

        Some(match cmd {
            "/help" | "/?" => SlashCommand::Help,
            "/quit" | "/exit" => SlashCommand::Quit,
            "/servers" => SlashCommand::Servers,
            "/tools" => SlashCommand::Tools,
            "/connect" => with_server("/connect <server>", SlashCommand::Connect),
            "/disconnect" => with_server("/disconnect <server>", SlashCommand::Disconnect),
            "/check" => with_server("/check <server>", SlashCommand::Check),
            "/model" => SlashCommand::Model(arg.map(str::to_string)),
            other => SlashCommand::Unknown(other.to_string()),
        })
    }
}

pub fn print_help() {
    eprintln!("Available commands:");
    eprintln!("  /servers             Show configured servers and their status");
    eprintln!("  /connect <server>    Connect to a configured server");
    eprintln!("  /disconnect <server> Disconnect from a server");
    eprintln!("  /check <server>      Probe whether a server is reachable");
    eprintln!("  /tools               List capabilities of connected servers");
    eprintln!("  /model [name]        Show available models, or switch to one");
    eprintln!("  /help                Show this help");
    eprintln!("  /quit                Exit");
}

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// `/quit` or `/exit`.
    Quit,
    /// `/state`: print the thread's state document.
    State,
    /// `/agent [name]`: switch agents, or back to the server default.
    Agent(Option<&'a str>),
    /// A slash command that is not one of the above.
    Unknown(&'a str),
    /// Anything else is sent to the agent.
    Message(&'a str),
}

impl<'a> Command<'a> {
    /// Parse a line; `None` for blank input.
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if !line.starts_with('/') {
            return Some(Self::Message(line));
        }

        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or(line);
        let command = match command {
            "/quit" | "/exit" => Self::Quit,
            "/state" => Self::State,
            "/agent" => Self::Agent(parts.next()),
            other => Self::Unknown(other),
        };
        Some(command)
    }
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;

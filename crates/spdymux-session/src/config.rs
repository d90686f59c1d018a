/// Which end of the connection this session is.
///
/// The role fixes stream id parity: clients open odd-numbered streams,
/// servers open even-numbered ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    /// First stream id this role may open.
    pub fn first_local_id(self) -> u32 {
        match self {
            Role::Client => 1,
            Role::Server => 2,
        }
    }

    /// First stream id the peer of this role may open.
    pub fn first_remote_id(self) -> u32 {
        match self {
            Role::Client => 2,
            Role::Server => 1,
        }
    }

    /// True if `id` has the parity this role uses for streams it opens.
    pub fn is_local_id(self, id: u32) -> bool {
        match self {
            Role::Client => id % 2 == 1,
            Role::Server => id % 2 == 0,
        }
    }
}

/// Session behavior knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Advertise shutdown with a go-away frame when no inbound stream
    /// handler is installed.
    pub go_away_without_handler: bool,
    /// Echo pings whose id has the peer's parity.
    pub reply_to_ping: bool,
    /// Prefix for the names of threads the session spawns.
    pub thread_name_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            go_away_without_handler: true,
            reply_to_ping: true,
            thread_name_prefix: "spdymux".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_by_role() {
        assert_eq!(Role::Client.first_local_id(), 1);
        assert_eq!(Role::Server.first_local_id(), 2);
        assert_eq!(Role::Client.first_remote_id(), 2);
        assert_eq!(Role::Server.first_remote_id(), 1);

        assert!(Role::Client.is_local_id(5));
        assert!(!Role::Client.is_local_id(4));
        assert!(Role::Server.is_local_id(4));
    }
}

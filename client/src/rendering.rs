//! Text shown to the player

pub const MAIN_MENU: &str =
    "Choose what to do next:\n1. Play against another client\n2. Quit\nType 1 or 2";
pub const NO_OPPONENTS: &str = "No opponents were found for conducting a game.";
pub const GAME_ON: &str = "Game is on!";
pub const SETUP_PROMPT: &str = "Choose your 4 digits:";
pub const GUESS_PROMPT: &str = "Choose your guess:";
pub const DRAW: &str = "It's a tie";
pub const OPPONENT_QUIT: &str = "Opponent quit.";
pub const INVALID_CHOICE: &str = "Invalid choice. Type 1 or 2";
pub const INVALID_CODE: &str = "Please type exactly 4 digits";
pub const RECONNECT_MENU: &str =
    "Choose what to do next:\n1. Try to reconnect\n2. Exit\nType 1 or 2";

pub fn connected(addr: &str) -> String {
    format!("Connected to server on {}", addr)
}

pub fn denied(addr: &str) -> String {
    format!("Server on {} denied the connection request.", addr)
}

/// Shown before the reconnect menu when the server was unreachable or the
/// session broke off. A denial skips this line.
pub fn connection_failed(addr: &str) -> String {
    format!("Failed connecting to server on {}.", addr)
}

pub fn round_results(bulls: &str, cows: &str, opponent: &str, guess: &str) -> String {
    format!(
        "Bulls: {}\nCows: {}\n{} played: {}",
        bulls, cows, opponent, guess
    )
}

pub fn win(winner: &str, opponent_code: &str) -> String {
    format!("{} won!\nopponents number was {}", winner, opponent_code)
}

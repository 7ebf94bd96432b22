pub mod grant;
pub mod server;
pub mod token;

// The match over actions lives in `run` so this module only declares them.
mod run;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    Token(token::Args),
    Grant(grant::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}

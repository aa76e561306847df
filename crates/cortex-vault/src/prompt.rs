// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vault passphrase acquisition from `CORTEX_VAULT_KEY` or an interactive TTY.

use std::io::IsTerminal;

use cortex_core::CortexError;
use secrecy::SecretString;

/// Environment variable consulted before prompting.
pub const VAULT_KEY_ENV_VAR: &str = "CORTEX_VAULT_KEY";

/// Read the vault passphrase.
///
/// The environment variable wins (headless deployments). Otherwise the
/// operator is prompted, twice when `confirm` is set.
pub fn read_passphrase(confirm: bool) -> Result<SecretString, CortexError> {
    if let Ok(key) = std::env::var(VAULT_KEY_ENV_VAR)
        && !key.is_empty()
    {
        return Ok(SecretString::from(key));
    }

    if !std::io::stdin().is_terminal() {
        return Err(CortexError::Vault(format!(
            "no passphrase available: set {VAULT_KEY_ENV_VAR} or run interactively"
        )));
    }

    let first = prompt("Vault passphrase: ")?;
    if confirm && prompt("Confirm vault passphrase: ")? != first {
        return Err(CortexError::Vault("passphrases do not match".to_string()));
    }
    Ok(SecretString::from(first))
}

fn prompt(label: &str) -> Result<String, CortexError> {
    eprint!("{label}");
    let value = rpassword::read_password()
        .map_err(|e| CortexError::Vault(format!("failed to read passphrase: {e}")))?;
    if value.is_empty() {
        return Err(CortexError::Vault("empty passphrase not allowed".to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    #[test]
    #[serial]
    fn env_var_takes_precedence() {
        // SAFETY: serialized with other env-mutating tests.
        unsafe { std::env::set_var(VAULT_KEY_ENV_VAR, "from-env") };
        let passphrase = read_passphrase(true).unwrap();
        assert_eq!(passphrase.expose_secret(), "from-env");
        unsafe { std::env::remove_var(VAULT_KEY_ENV_VAR) };
    }
}

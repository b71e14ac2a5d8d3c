// SPDX-FileCopyrightText: 2026 Cloak Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`KeyProvider`] backends.
//!
//! The native backends shell out to the platform's credential-store CLI
//! (`security`, `secret-tool`, PowerShell) so no FFI bindings are needed.
//! Key material is always passed on stdin, never in argv.

use std::collections::HashMap;
use std::path::Path;
use std::process::{Output, Stdio};
use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;
use cloak_config::{KeychainBackend, KeychainConfig};
use cloak_core::{CloakError, KeyProvider};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use zeroize::Zeroizing;

/// `security(1)` exit code for "item not found".
const SECURITY_NOT_FOUND: i32 = 44;

const ENTRY_LABEL: &str = "Cloak vault key";

/// Credential-store account name for a store directory.
pub fn account_for(store_dir: &Path) -> String {
    format!("vault:{}", store_dir.display())
}

/// Build the provider selected by `config` for the vault in `store_dir`.
pub fn key_provider_for(config: &KeychainConfig, store_dir: &Path) -> Box<dyn KeyProvider> {
    let service = config.service.clone();
    let account = account_for(store_dir);
    let backend = match config.backend {
        KeychainBackend::Auto if cfg!(target_os = "macos") => KeychainBackend::Macos,
        KeychainBackend::Auto if cfg!(target_os = "linux") => KeychainBackend::Linux,
        KeychainBackend::Auto if cfg!(windows) => KeychainBackend::Windows,
        KeychainBackend::Auto => KeychainBackend::None,
        other => other,
    };
    debug!(backend = %backend, account = %account, "key provider selected");
    match backend {
        KeychainBackend::Macos => Box::new(MacosKeychain::new(service, account)),
        KeychainBackend::Linux => Box::new(LinuxSecretService::new(service, account)),
        KeychainBackend::Windows => Box::new(WindowsCredentialStore::new(service, account)),
        KeychainBackend::Memory => Box::new(MemoryKeyProvider::process_shared(account)),
        KeychainBackend::None | KeychainBackend::Auto => Box::new(UnavailableKeyProvider),
    }
}

/// Whether `program` resolves to a file on `PATH`.
pub fn binary_on_path(program: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        let candidate = dir.join(program);
        candidate.is_file() || (cfg!(windows) && candidate.with_extension("exe").is_file())
    })
}

async fn run_tool(
    program: &str,
    args: &[&str],
    envs: &[(&str, &str)],
    stdin: Option<&[u8]>,
) -> Result<Output, CloakError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(envs.iter().copied())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| CloakError::KeyProvider(format!("failed to run {program}: {e}")))?;

    if let Some(input) = stdin
        && let Some(mut pipe) = child.stdin.take()
    {
        pipe.write_all(input)
            .await
            .map_err(|e| CloakError::KeyProvider(format!("failed to write to {program}: {e}")))?;
        drop(pipe);
    }

    child
        .wait_with_output()
        .await
        .map_err(|e| CloakError::KeyProvider(format!("{program} did not complete: {e}")))
}

fn tool_failure(program: &str, output: &Output) -> CloakError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    CloakError::KeyProvider(format!(
        "{program} exited with {}: {}",
        output.status,
        stderr.trim()
    ))
}

fn secret_from_stdout(output: Output) -> Result<Option<SecretString>, CloakError> {
    let stdout = Zeroizing::new(output.stdout);
    let text = std::str::from_utf8(&stdout)
        .map_err(|_| CloakError::KeyProvider("stored key is not valid UTF-8".to_string()))?
        .trim();
    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some(SecretString::from(text.to_string())))
}

/// macOS login keychain via `security(1)`.
#[derive(Debug, Clone)]
pub struct MacosKeychain {
    service: String,
    account: String,
}

impl MacosKeychain {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

#[async_trait]
impl KeyProvider for MacosKeychain {
    fn name(&self) -> &str {
        "macos-keychain"
    }

    async fn available(&self) -> bool {
        cfg!(target_os = "macos") && binary_on_path("security")
    }

    /// `add-generic-password` only takes the key as an argument, so the
    /// command is fed to `security -i` on stdin and the key never appears in
    /// argv. Interactive mode does not report per-command failure in its exit
    /// status, so the entry is read back and compared.
    async fn store(&self, key: &SecretString) -> Result<(), CloakError> {
        let script = add_password_script(&self.account, &self.service, key.expose_secret());
        let output = run_tool("security", &["-i"], &[], Some(script.as_bytes())).await?;
        if !output.status.success() {
            return Err(tool_failure("security", &output));
        }
        match self.retrieve().await? {
            Some(stored) if stored.expose_secret() == key.expose_secret() => Ok(()),
            _ => Err(tool_failure("security", &output)),
        }
    }

    async fn retrieve(&self) -> Result<Option<SecretString>, CloakError> {
        let output = run_tool(
            "security",
            &[
                "find-generic-password",
                "-a",
                &self.account,
                "-s",
                &self.service,
                "-w",
            ],
            &[],
            None,
        )
        .await?;
        if output.status.code() == Some(SECURITY_NOT_FOUND) {
            return Ok(None);
        }
        if !output.status.success() {
            return Err(tool_failure("security", &output));
        }
        secret_from_stdout(output)
    }

    async fn delete(&self) -> Result<(), CloakError> {
        let output = run_tool(
            "security",
            &[
                "delete-generic-password",
                "-a",
                &self.account,
                "-s",
                &self.service,
            ],
            &[],
            None,
        )
        .await?;
        if output.status.success() || output.status.code() == Some(SECURITY_NOT_FOUND) {
            Ok(())
        } else {
            Err(tool_failure("security", &output))
        }
    }
}

/// One `security -i` line that adds or replaces the generic password.
fn add_password_script(account: &str, service: &str, key: &str) -> Zeroizing<String> {
    let key = Zeroizing::new(security_quote(key));
    Zeroizing::new(format!(
        "add-generic-password -U -a {} -s {} -l {} -w {}\n",
        security_quote(account),
        security_quote(service),
        security_quote(ENTRY_LABEL),
        key.as_str(),
    ))
}

fn security_quote(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// freedesktop Secret Service (GNOME Keyring, KWallet) via `secret-tool`.
#[derive(Debug, Clone)]
pub struct LinuxSecretService {
    service: String,
    account: String,
}

impl LinuxSecretService {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn attributes(&self) -> [&str; 4] {
        ["service", &self.service, "account", &self.account]
    }
}

#[async_trait]
impl KeyProvider for LinuxSecretService {
    fn name(&self) -> &str {
        "secret-service"
    }

    async fn available(&self) -> bool {
        cfg!(target_os = "linux") && binary_on_path("secret-tool")
    }

    async fn store(&self, key: &SecretString) -> Result<(), CloakError> {
        let label = format!("--label={ENTRY_LABEL}");
        let mut args = vec!["store", label.as_str()];
        args.extend(self.attributes());
        let output = run_tool(
            "secret-tool",
            &args,
            &[],
            Some(key.expose_secret().as_bytes()),
        )
        .await?;
        if !output.status.success() {
            return Err(tool_failure("secret-tool", &output));
        }
        Ok(())
    }

    async fn retrieve(&self) -> Result<Option<SecretString>, CloakError> {
        let mut args = vec!["lookup"];
        args.extend(self.attributes());
        let output = run_tool("secret-tool", &args, &[], None).await?;
        // lookup exits 1 with empty output when nothing matches.
        if !output.status.success() {
            if output.stdout.is_empty() && output.stderr.is_empty() {
                return Ok(None);
            }
            return Err(tool_failure("secret-tool", &output));
        }
        secret_from_stdout(output)
    }

    async fn delete(&self) -> Result<(), CloakError> {
        let mut args = vec!["clear"];
        args.extend(self.attributes());
        let output = run_tool("secret-tool", &args, &[], None).await?;
        if output.status.success() || output.stderr.is_empty() {
            Ok(())
        } else {
            Err(tool_failure("secret-tool", &output))
        }
    }
}

const PS_LOAD_VAULT: &str = "[void][Windows.Security.Credentials.PasswordVault,Windows.Security.Credentials,ContentType=WindowsRuntime]; $v = New-Object Windows.Security.Credentials.PasswordVault;";

/// Windows Credential Locker via PowerShell's `PasswordVault` projection.
///
/// Service and account travel in environment variables, the key on stdin,
/// so nothing sensitive is interpolated into the script text.
#[derive(Debug, Clone)]
pub struct WindowsCredentialStore {
    service: String,
    account: String,
}

impl WindowsCredentialStore {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    async fn powershell(&self, body: &str, stdin: Option<&[u8]>) -> Result<Output, CloakError> {
        let script = format!("{PS_LOAD_VAULT} {body}");
        run_tool(
            "powershell",
            &["-NoProfile", "-NonInteractive", "-Command", &script],
            &[
                ("CLOAK_KC_SERVICE", self.service.as_str()),
                ("CLOAK_KC_ACCOUNT", self.account.as_str()),
            ],
            stdin,
        )
        .await
    }
}

#[async_trait]
impl KeyProvider for WindowsCredentialStore {
    fn name(&self) -> &str {
        "windows-credential-locker"
    }

    async fn available(&self) -> bool {
        cfg!(windows) && binary_on_path("powershell")
    }

    async fn store(&self, key: &SecretString) -> Result<(), CloakError> {
        let output = self
            .powershell(
                "$k = [Console]::In.ReadLine(); \
                 try { $v.Remove($v.Retrieve($env:CLOAK_KC_SERVICE, $env:CLOAK_KC_ACCOUNT)) } catch {}; \
                 $v.Add((New-Object Windows.Security.Credentials.PasswordCredential($env:CLOAK_KC_SERVICE, $env:CLOAK_KC_ACCOUNT, $k)))",
                Some(format!("{}\n", key.expose_secret()).as_bytes()),
            )
            .await?;
        if !output.status.success() {
            return Err(tool_failure("powershell", &output));
        }
        Ok(())
    }

    async fn retrieve(&self) -> Result<Option<SecretString>, CloakError> {
        let output = self
            .powershell(
                "try { $c = $v.Retrieve($env:CLOAK_KC_SERVICE, $env:CLOAK_KC_ACCOUNT) } catch { exit 44 }; \
                 $c.RetrievePassword(); [Console]::Out.Write($c.Password)",
                None,
            )
            .await?;
        if output.status.code() == Some(SECURITY_NOT_FOUND) {
            return Ok(None);
        }
        if !output.status.success() {
            return Err(tool_failure("powershell", &output));
        }
        secret_from_stdout(output)
    }

    async fn delete(&self) -> Result<(), CloakError> {
        let output = self
            .powershell(
                "try { $v.Remove($v.Retrieve($env:CLOAK_KC_SERVICE, $env:CLOAK_KC_ACCOUNT)) } catch {}",
                None,
            )
            .await?;
        if !output.status.success() {
            return Err(tool_failure("powershell", &output));
        }
        Ok(())
    }
}

type KeyMap = Arc<Mutex<HashMap<String, Zeroizing<String>>>>;

static PROCESS_KEYS: LazyLock<KeyMap> = LazyLock::new(KeyMap::default);

/// In-process key map. Clones share entries; keys vanish when the process exits.
#[derive(Debug, Clone)]
pub struct MemoryKeyProvider {
    entries: KeyMap,
    account: String,
}

impl MemoryKeyProvider {
    /// A provider with its own empty map.
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            entries: KeyMap::default(),
            account: account.into(),
        }
    }

    /// A provider backed by the map shared by every `process_shared` provider.
    pub fn process_shared(account: impl Into<String>) -> Self {
        Self {
            entries: Arc::clone(&PROCESS_KEYS),
            account: account.into(),
        }
    }

    /// Another account in the same map.
    pub fn for_account(&self, account: impl Into<String>) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            account: account.into(),
        }
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Zeroizing<String>>>, CloakError> {
        self.entries
            .lock()
            .map_err(|_| CloakError::KeyProvider("memory key store poisoned".to_string()))
    }
}

#[async_trait]
impl KeyProvider for MemoryKeyProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn available(&self) -> bool {
        true
    }

    async fn store(&self, key: &SecretString) -> Result<(), CloakError> {
        self.lock()?.insert(
            self.account.clone(),
            Zeroizing::new(key.expose_secret().to_string()),
        );
        Ok(())
    }

    async fn retrieve(&self) -> Result<Option<SecretString>, CloakError> {
        Ok(self
            .lock()?
            .get(&self.account)
            .map(|key| SecretString::from(key.as_str().to_string())))
    }

    async fn delete(&self) -> Result<(), CloakError> {
        self.lock()?.remove(&self.account);
        Ok(())
    }
}

/// No credential store at all; only `CLOAK_VAULT_KEY` can supply a key.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableKeyProvider;

#[async_trait]
impl KeyProvider for UnavailableKeyProvider {
    fn name(&self) -> &str {
        "none"
    }

    async fn available(&self) -> bool {
        false
    }

    async fn store(&self, _key: &SecretString) -> Result<(), CloakError> {
        Err(CloakError::KeyProvider(
            "no key provider configured on this host".to_string(),
        ))
    }

    async fn retrieve(&self) -> Result<Option<SecretString>, CloakError> {
        Ok(None)
    }

    async fn delete(&self) -> Result<(), CloakError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn memory_store_retrieve_delete() {
        let provider = MemoryKeyProvider::new("vault:/tmp/a");
        assert!(provider.available().await);
        assert!(provider.retrieve().await.unwrap().is_none());

        provider
            .store(&SecretString::from("k1".to_string()))
            .await
            .unwrap();
        let key = provider.retrieve().await.unwrap().unwrap();
        assert_eq!(key.expose_secret(), "k1");

        provider.delete().await.unwrap();
        assert!(provider.retrieve().await.unwrap().is_none());
        // Deleting again is fine.
        provider.delete().await.unwrap();
    }

    #[tokio::test]
    async fn memory_clones_share_entries_but_accounts_are_isolated() {
        let a = MemoryKeyProvider::new("vault:a");
        let a2 = a.clone();
        let b = a.for_account("vault:b");

        a.store(&SecretString::from("alpha".to_string()))
            .await
            .unwrap();
        assert_eq!(
            a2.retrieve().await.unwrap().unwrap().expose_secret(),
            "alpha"
        );
        assert!(b.retrieve().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unavailable_provider_refuses_store() {
        let provider = UnavailableKeyProvider;
        assert!(!provider.available().await);
        assert!(provider.retrieve().await.unwrap().is_none());
        assert!(matches!(
            provider.store(&SecretString::from("k".to_string())).await,
            Err(CloakError::KeyProvider(_))
        ));
        provider.delete().await.unwrap();
    }

    #[test]
    fn account_names_the_store_dir() {
        assert_eq!(
            account_for(&PathBuf::from("/home/u/.cloak/envs/prod")),
            "vault:/home/u/.cloak/envs/prod"
        );
    }

    #[test]
    fn backend_selection() {
        let dir = PathBuf::from("/tmp/store");
        let mut config = KeychainConfig::default();

        config.backend = KeychainBackend::None;
        assert_eq!(key_provider_for(&config, &dir).name(), "none");

        config.backend = KeychainBackend::Memory;
        assert_eq!(key_provider_for(&config, &dir).name(), "memory");

        config.backend = KeychainBackend::Linux;
        assert_eq!(key_provider_for(&config, &dir).name(), "secret-service");

        config.backend = KeychainBackend::Macos;
        assert_eq!(key_provider_for(&config, &dir).name(), "macos-keychain");
    }

    #[test]
    fn missing_binary_is_not_on_path() {
        assert!(!binary_on_path("cloak-definitely-not-a-real-binary"));
    }

    #[test]
    fn macos_add_line_quotes_every_argument() {
        let script = add_password_script("vault:/tmp/my \"dir\"", "cloak", "a\\b+c=");
        assert_eq!(
            script.as_str(),
            "add-generic-password -U -a \"vault:/tmp/my \\\"dir\\\"\" -s \"cloak\" \
             -l \"Cloak vault key\" -w \"a\\\\b+c=\"\n"
        );
    }
}

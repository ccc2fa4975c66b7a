//! Identity reconciliation: maps a verified credential to exactly one
//! account, creating or linking records as needed.

use service_core::error::AppError;
use validator::Validate;

use crate::models::{Account, AccountType, Identity, IdentityProvider, LoginResponse, SignupRequest};
use crate::services::oauth::OAuthResult;
use crate::services::{Database, JwtService};
use crate::utils::password::{hash_password, verify_password, Password, PasswordHashString};

#[derive(Clone)]
pub struct Reconciler {
    db: Database,
    jwt: JwtService,
}

impl Reconciler {
    pub fn new(db: Database, jwt: JwtService) -> Self {
        Self { db, jwt }
    }

    /// Password signup: new account plus its password identity, committed
    /// together or not at all.
    pub async fn signup(&self, req: &SignupRequest) -> Result<LoginResponse, AppError> {
        if self.db.account_exists(&req.email).await? {
            return Err(account_exists());
        }

        let account = Account::new(req.email.clone(), req.account_type);
        account.validate()?;

        let hash = hash_password(&Password::new(req.password.clone()))?;

        let mut tx = self.db.begin().await?;
        let account_iid = match self.db.insert_account(&mut tx, &account).await {
            Ok(iid) => iid,
            // The email unique constraint closes the race the exists()
            // check above cannot.
            Err(AppError::Conflict { .. }) => return Err(account_exists()),
            Err(e) => return Err(e),
        };

        let identity = Identity::new_password(account_iid, &req.email, hash.into_string());
        if let Err(e) = self.db.insert_identity(&mut tx, &identity).await {
            return Err(match e {
                AppError::Conflict { .. } => account_exists(),
                other => other,
            });
        }
        self.db.commit(tx).await?;

        tracing::info!(account_iid, "Account created");

        let token = self.jwt.sign(&account.email)?;
        Ok(LoginResponse::new(token))
    }

    /// Password login.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, AppError> {
        let account = self
            .db
            .find_account_by_email(email)
            .await?
            .ok_or_else(no_account)?;

        let identity = self
            .db
            .find_identity(IdentityProvider::Email, &account.email)
            .await?
            .ok_or_else(no_account)?;

        let hash = identity.pw_hash.ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!("Password identity without hash"))
        })?;

        verify_password(
            &Password::new(password.to_string()),
            &PasswordHashString::new(hash),
        )?;

        let token = self.jwt.sign(&account.email)?;
        Ok(LoginResponse::new(token))
    }

    /// OAuth login or link. `(provider, uid)` is the reconciliation key;
    /// the email only locates a candidate account to link to.
    pub async fn oauth_login(
        &self,
        result: &OAuthResult,
        requested_type: AccountType,
    ) -> Result<LoginResponse, AppError> {
        let account = match self.resolve_existing_identity(result, requested_type).await? {
            Some(account) => account,
            None => match self.db.find_account_by_email(&result.email).await? {
                Some(existing) => self.link_identity(existing, result, requested_type).await?,
                None => match self.create_from_oauth(result, requested_type).await {
                    Ok(account) => account,
                    // Lost the insert race: a concurrent callback created
                    // the account or identity first. Reconcile against
                    // whatever won.
                    Err(AppError::Conflict { .. }) => {
                        self.reconcile_after_race(result, requested_type).await?
                    }
                    Err(e) => return Err(e),
                },
            },
        };

        let token = self.jwt.sign(&account.email)?;
        Ok(LoginResponse::new(token))
    }

    /// The identity already exists: log its account in, merging the
    /// requested type if it is new.
    async fn resolve_existing_identity(
        &self,
        result: &OAuthResult,
        requested_type: AccountType,
    ) -> Result<Option<Account>, AppError> {
        let Some(identity) = self.db.find_identity(result.provider, &result.external_id).await?
        else {
            return Ok(None);
        };

        let mut account = self
            .db
            .find_account_by_iid(identity.account_iid)
            .await?
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Identity {} has no owning account",
                    identity.iid
                ))
            })?;

        if account.merge_type(requested_type) {
            account.validate()?;
            self.db.update_account(&account).await?;
        }

        Ok(Some(account))
    }

    /// An account exists for the email: bind this provider identity to it.
    async fn link_identity(
        &self,
        mut account: Account,
        result: &OAuthResult,
        requested_type: AccountType,
    ) -> Result<Account, AppError> {
        let identity = Identity::new_oauth(result.provider, account.iid, &result.external_id);

        let mut tx = self.db.begin().await?;
        let linked = self.db.insert_identity_if_new(&mut tx, &identity).await?;
        if account.merge_type(requested_type) {
            account.validate()?;
            self.db
                .update_account_types(&mut tx, account.iid, &account.types)
                .await?;
        }
        self.db.commit(tx).await?;

        if linked {
            tracing::info!(
                account_iid = account.iid,
                provider = result.provider.as_str(),
                "Linked new identity to existing account"
            );
        }

        Ok(account)
    }

    /// No account, no identity: signup via OAuth.
    async fn create_from_oauth(
        &self,
        result: &OAuthResult,
        requested_type: AccountType,
    ) -> Result<Account, AppError> {
        let mut account = Account::new(result.email.clone(), requested_type);
        account.validate()?;

        let mut tx = self.db.begin().await?;
        let iid = self.db.insert_account(&mut tx, &account).await?;
        account.iid = iid;

        let identity = Identity::new_oauth(result.provider, iid, &result.external_id);
        self.db.insert_identity(&mut tx, &identity).await?;
        self.db.commit(tx).await?;

        tracing::info!(
            account_iid = iid,
            provider = result.provider.as_str(),
            "Account created via OAuth"
        );

        Ok(account)
    }

    /// The create path hit a unique constraint; re-run the lookups against
    /// the winner's rows.
    async fn reconcile_after_race(
        &self,
        result: &OAuthResult,
        requested_type: AccountType,
    ) -> Result<Account, AppError> {
        if let Some(account) = self.resolve_existing_identity(result, requested_type).await? {
            return Ok(account);
        }

        let account = self
            .db
            .find_account_by_email(&result.email)
            .await?
            .ok_or_else(|| {
                AppError::conflict(
                    "conflict",
                    anyhow::anyhow!("Lost OAuth insert race but no account resolved"),
                )
            })?;

        self.link_identity(account, result, requested_type).await
    }
}

fn account_exists() -> AppError {
    AppError::conflict(
        "account_exists",
        anyhow::anyhow!("Account with email already exists"),
    )
}

fn no_account() -> AppError {
    AppError::not_found("no_account", anyhow::anyhow!("Account not found"))
}

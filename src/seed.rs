use tracing::info;

use crate::auth::claims::Role;
use crate::auth::password::hash_password;
use crate::auth::repo::NewUser;
use crate::state::AppState;

const DEMO_PASSWORD: &str = "demo123";

const DEMO_ACCOUNTS: &[(&str, &str, Role)] = &[
    ("doctor@hospital.com", "Dr. Jean Dupont", Role::Doctor),
    ("pharmacist@pharmacy.com", "Marie Martin", Role::Pharmacist),
    ("driver@delivery.com", "Pierre Durand", Role::Driver),
    ("patient@email.com", "Sophie Moreau", Role::Patient),
    ("admin@mediflow.com", "Admin MediFlow", Role::Admin),
];

/// Provisions the always-available demo identities against the real
/// credential store, once, at process start. Upserting by email keeps the
/// routine idempotent across restarts; there is deliberately no in-memory
/// shadow copy of these accounts anywhere in the request path.
pub async fn seed_demo_accounts(state: &AppState) -> anyhow::Result<()> {
    for (email, name, role) in DEMO_ACCOUNTS {
        let user = state
            .users
            .upsert_by_email(NewUser {
                email: (*email).to_string(),
                password_hash: hash_password(DEMO_PASSWORD)?,
                name: (*name).to_string(),
                role: *role,
                is_active: true,
            })
            .await?;
        info!(user_id = %user.id, email, role = %role, "demo account seeded");
    }
    Ok(())
}

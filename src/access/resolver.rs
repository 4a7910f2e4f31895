use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Dataset, Grant, Role};

/// Role everyone gets on a dataset without a grant.
#[must_use]
pub const fn public_default(public: bool, price: i64) -> Role {
    match (public, price) {
        (false, _) => Role::None,
        (true, 0) => Role::Contributor,
        (true, _) => Role::Preview,
    }
}

/// Effective role from ownership, an optional explicit grant, and visibility.
///
/// Ownership short-circuits everything including a blocked grant. A blocked
/// grant otherwise absorbs the public default.
#[must_use]
pub fn default_role(is_owner: bool, grant: Option<Role>, public: bool, price: i64) -> Role {
    if is_owner {
        return Role::Owner;
    }
    let fallback = public_default(public, price);
    match grant {
        Some(role) => role.max(fallback),
        None => fallback,
    }
}

fn evaluate(store: &dyn Store, dataset: &Dataset, actor: Option<&str>) -> Result<(Role, Option<Role>)> {
    let Some(actor) = actor else {
        return Ok((public_default(dataset.public, dataset.price), None));
    };

    if actor == dataset.owner_id {
        return Ok((Role::Owner, None));
    }

    let grant = store.get_grant(&dataset.id, actor)?.map(|g| g.role);
    let role = default_role(false, grant, dataset.public, dataset.price);
    Ok((role, grant))
}

/// Effective role of `actor` on `dataset`. Anonymous actors get the public default.
pub fn resolve(store: &dyn Store, dataset: &Dataset, actor: Option<&str>) -> Result<Role> {
    evaluate(store, dataset, actor).map(|(role, _)| role)
}

/// Checks that `actor` holds at least `required` on `dataset`.
///
/// On a private dataset an actor without a usable grant is told the dataset
/// does not exist rather than that access was denied.
pub fn authorize(
    store: &dyn Store,
    dataset: &Dataset,
    actor: Option<&str>,
    required: Role,
) -> Result<Role> {
    let (role, grant) = evaluate(store, dataset, actor)?;
    if role.satisfies(required) {
        return Ok(role);
    }

    let hidden = !dataset.public && matches!(grant, None | Some(Role::Blocked | Role::None));
    if hidden {
        tracing::debug!(dataset_id = %dataset.id, "hiding private dataset from actor");
        return Err(Error::NotFound("dataset"));
    }

    Err(Error::PermissionDenied {
        required,
        actual: role,
    })
}

/// A purchase is offered only to non-owners without any grant on a public paid dataset.
#[must_use]
pub fn can_purchase(dataset: &Dataset, actor: &str, grant: Option<&Grant>) -> bool {
    grant.is_none() && dataset.public && dataset.price > 0 && dataset.owner_id != actor
}

/// Effective roles for a batch of datasets with a single grant query.
pub fn aggregate_roles(
    store: &dyn Store,
    datasets: &[Dataset],
    actor: Option<&str>,
) -> Result<HashMap<String, Role>> {
    let grants: HashMap<String, Role> = match actor {
        Some(actor) => {
            let ids: Vec<String> = datasets
                .iter()
                .filter(|d| d.owner_id != actor)
                .map(|d| d.id.clone())
                .collect();
            store
                .list_user_grants_for_datasets(actor, &ids)?
                .into_iter()
                .map(|g| (g.dataset_id, g.role))
                .collect()
        }
        None => HashMap::new(),
    };

    Ok(datasets
        .iter()
        .map(|d| {
            let is_owner = actor.is_some_and(|a| a == d.owner_id);
            let role = default_role(is_owner, grants.get(&d.id).copied(), d.public, d.price);
            (d.id.clone(), role)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const PRICES: [i64; 2] = [0, 500];

    fn dataset(public: bool, price: i64) -> Dataset {
        Dataset {
            id: "ds-1".to_string(),
            owner_id: "owner".to_string(),
            name: "streets".to_string(),
            description: None,
            recipe_id: "recipe-1".to_string(),
            public,
            price,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn grant(role: Role) -> Grant {
        Grant {
            dataset_id: "ds-1".to_string(),
            user_id: "someone".to_string(),
            role,
            purchased: false,
            purchased_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn every_grant() -> impl Iterator<Item = Option<Role>> {
        std::iter::once(None).chain(Role::ALL.into_iter().map(Some))
    }

    #[test]
    fn test_public_defaults() {
        assert_eq!(public_default(false, 0), Role::None);
        assert_eq!(public_default(false, 500), Role::None);
        assert_eq!(public_default(true, 0), Role::Contributor);
        assert_eq!(public_default(true, 500), Role::Preview);
    }

    #[test]
    fn test_owner_bypasses_blocked() {
        assert_eq!(
            default_role(true, Some(Role::Blocked), false, 0),
            Role::Owner
        );
    }

    #[test]
    fn test_blocked_overrides_visibility() {
        for public in [true, false] {
            for price in PRICES {
                let role = default_role(false, Some(Role::Blocked), public, price);
                assert_eq!(role, Role::Blocked);
                for required in Role::ALL {
                    assert!(!role.satisfies(required));
                }
            }
        }
    }

    #[test]
    fn test_grant_never_lowers_public_default() {
        assert_eq!(
            default_role(false, Some(Role::Preview), true, 0),
            Role::Contributor
        );
        assert_eq!(
            default_role(false, Some(Role::Maintainer), true, 500),
            Role::Maintainer
        );
        assert_eq!(default_role(false, None, true, 500), Role::Preview);
    }

    #[test]
    fn test_role_monotonicity() {
        for public in [true, false] {
            for price in PRICES {
                for g in every_grant() {
                    let role = default_role(false, g, public, price);
                    for r1 in Role::ALL {
                        if !role.satisfies(r1) {
                            continue;
                        }
                        for r2 in Role::ALL {
                            let lower = matches!(
                                (r2.rank(), r1.rank()),
                                (Some(a), Some(b)) if a <= b
                            );
                            if lower {
                                assert!(role.satisfies(r2), "{role} satisfies {r1} but not {r2}");
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_purchase_requires_public_paid_and_no_grant() {
        assert!(can_purchase(&dataset(true, 500), "buyer", None));
        assert!(!can_purchase(&dataset(true, 0), "buyer", None));
        assert!(!can_purchase(&dataset(false, 500), "buyer", None));
        assert!(!can_purchase(&dataset(true, 500), "owner", None));
        for role in Role::ALL {
            assert!(!can_purchase(&dataset(true, 500), "buyer", Some(&grant(role))));
        }
    }
}

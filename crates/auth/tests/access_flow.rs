use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use rolegate_auth::{
    Action, AuthConfig, AuthError, Authorizer, AuthzError, BusinessElement, CollectionAction,
    Credentials, Decision, DenyReason, ElementCode, InMemorySubjectDirectory, OwnedResource,
    PermissionRule, Principal, PrincipalResolver, Registration, Role, RoleDefinition, RuleEntry,
    RuleSet, RuleStore, SessionManager, SubjectId, TokenCodec, TokenKind,
};

struct Harness {
    codec: Arc<TokenCodec>,
    directory: Arc<InMemorySubjectDirectory>,
    resolver: PrincipalResolver,
    sessions: SessionManager,
    authz: Authorizer,
}

#[derive(Debug, Clone)]
struct Order {
    number: &'static str,
    owner: Option<SubjectId>,
}

impl OwnedResource for Order {
    fn owner_id(&self) -> Option<SubjectId> {
        self.owner
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 12, 0, 0).unwrap()
}

fn code(c: &'static str) -> ElementCode {
    ElementCode::new(c)
}

fn rule(role: &'static str, element: &'static str, rule: PermissionRule) -> RuleEntry {
    RuleEntry {
        role: Role::new(role),
        element: code(element),
        rule,
    }
}

/// Roles and elements of a small storefront; "manager" has no rule on
/// "access_rules".
fn policy() -> RuleSet {
    let elements = ["users", "products", "orders", "stores", "access_rules"];
    let mut rules = Vec::new();
    for element in elements {
        rules.push(rule("admin", element, PermissionRule::full()));
        rules.push(rule(
            "user",
            element,
            PermissionRule {
                read_own: true,
                create_own: true,
                update_own: true,
                delete_own: true,
                ..PermissionRule::default()
            },
        ));
        rules.push(rule(
            "guest",
            element,
            PermissionRule {
                read_all: matches!(element, "products" | "stores"),
                ..PermissionRule::default()
            },
        ));
        if element != "access_rules" {
            rules.push(rule(
                "manager",
                element,
                PermissionRule {
                    update_all: false,
                    delete_all: false,
                    ..PermissionRule::full()
                },
            ));
        }
    }

    RuleSet {
        roles: ["admin", "manager", "user", "guest"]
            .into_iter()
            .map(|r| RoleDefinition::new(Role::new(r), ""))
            .collect(),
        elements: elements
            .into_iter()
            .map(|c| BusinessElement::new(code(c), c))
            .collect(),
        rules,
    }
}

fn harness() -> Harness {
    rolegate_observability::init();

    let codec = Arc::new(TokenCodec::new(&AuthConfig::new("integration-secret")));
    let directory = Arc::new(InMemorySubjectDirectory::new());
    let rules = Arc::new(RuleStore::in_memory(policy()).unwrap());

    Harness {
        resolver: PrincipalResolver::new(codec.clone(), directory.clone()),
        sessions: SessionManager::new(codec.clone(), directory.clone()),
        authz: Authorizer::new(rules),
        codec,
        directory,
    }
}

impl Harness {
    fn principal_for(&self, email: &str, role: Option<&'static str>) -> (SubjectId, Principal) {
        let id = self
            .directory
            .insert(email, "password1", role.map(Role::new))
            .unwrap();
        let pair = self
            .sessions
            .login(&Credentials::new(email, "password1"), t0())
            .unwrap();
        let header = format!("Bearer {}", pair.access.as_str());
        (id, self.resolver.resolve(Some(header.as_str()), t0()))
    }
}

#[test]
fn scenario_a_guest_reads_someone_elses_product() {
    let h = harness();
    let (_, guest) = h.principal_for("guest@example.com", Some("guest"));
    let product = Order {
        number: "P-1",
        owner: Some(SubjectId::new()),
    };

    assert_eq!(
        h.authz
            .decide(&guest, &code("products"), Action::Read, Some(&product)),
        Decision::Allow
    );
    assert!(
        !h.authz
            .check(&guest, &code("orders"), Action::Read, &product)
            .is_allowed()
    );
}

#[test]
fn scenario_b_user_updates_only_own_orders() {
    let h = harness();
    let (me, user) = h.principal_for("user@example.com", Some("user"));
    let mine = Order {
        number: "ORD-001",
        owner: Some(me),
    };
    let theirs = Order {
        number: "ORD-002",
        owner: Some(SubjectId::new()),
    };

    let pre = h.authz.precheck(&user, &code("orders"), Action::Update);
    assert_eq!(pre.reject_early(), Ok(()));

    assert_eq!(
        h.authz
            .check(&user, &code("orders"), Action::Update, &mine)
            .into_result(),
        Ok(())
    );
    assert_eq!(
        h.authz
            .check(&user, &code("orders"), Action::Update, &theirs)
            .into_result(),
        Err(AuthzError::Forbidden)
    );
}

#[test]
fn scenario_c_missing_rule_denies_every_action() {
    let h = harness();
    let (me, manager) = h.principal_for("manager@example.com", Some("manager"));
    let own = Order {
        number: "R-1",
        owner: Some(me),
    };

    for action in Action::ALL {
        assert_eq!(
            h.authz
                .decide(&manager, &code("access_rules"), action, None),
            Decision::Deny(DenyReason::NotGranted)
        );
        assert!(
            !h.authz
                .decide(&manager, &code("access_rules"), action, Some(&own))
                .is_allowed()
        );
    }
}

#[test]
fn scenario_d_expired_access_token_resolves_anonymous() {
    let h = harness();
    let id = h
        .directory
        .insert("late@example.com", "password1", Some(Role::new("user")))
        .unwrap();
    let issued = t0() - Duration::minutes(31);
    let token = h.codec.issue(id, TokenKind::Access, issued).unwrap();

    let header = format!("Bearer {}", token.as_str());
    let principal = h.resolver.resolve(Some(header.as_str()), t0());
    assert_eq!(principal, Principal::Anonymous);
}

#[test]
fn refresh_token_never_authenticates_a_request() {
    let h = harness();
    h.directory
        .insert("r@example.com", "password1", Some(Role::new("admin")))
        .unwrap();
    let pair = h
        .sessions
        .login(&Credentials::new("r@example.com", "password1"), t0())
        .unwrap();

    let header = format!("Bearer {}", pair.refresh.as_str());
    let principal = h.resolver.resolve(Some(header.as_str()), t0());
    assert_eq!(principal, Principal::Anonymous);
    assert_eq!(
        h.authz
            .check_collection(&principal, &code("orders"), CollectionAction::List)
            .into_result(),
        Err(AuthzError::Unauthenticated)
    );
}

#[test]
fn register_then_work_then_refresh() {
    let h = harness();
    let (subject, pair) = h
        .sessions
        .register(&Registration::new("new@example.com", "password1"), t0())
        .unwrap();

    // Fresh registrations carry no role and therefore no capability.
    let header = format!("Bearer {}", pair.access.as_str());
    let principal = h.resolver.resolve(Some(header.as_str()), t0());
    assert_eq!(principal, Principal::authenticated(subject.id, None));
    assert_eq!(
        h.authz
            .check_collection(&principal, &code("orders"), CollectionAction::Create)
            .into_result(),
        Err(AuthzError::Forbidden)
    );

    // An administrator grants a role; it applies on the next request.
    h.directory
        .assign_role(subject.id, Some(Role::new("user")))
        .unwrap();
    let principal = h.resolver.resolve(Some(header.as_str()), t0());
    assert!(
        h.authz
            .check_collection(&principal, &code("orders"), CollectionAction::Create)
            .is_allowed()
    );

    // After the access token lapses, the refresh token yields a new one.
    let later = t0() + Duration::minutes(45);
    let principal = h.resolver.resolve(Some(header.as_str()), later);
    assert_eq!(principal, Principal::Anonymous);

    let access = h.sessions.refresh(pair.refresh.as_str(), later).unwrap();
    let header = format!("Bearer {}", access.as_str());
    let principal = h.resolver.resolve(Some(header.as_str()), later);
    assert!(principal.is_authenticated());

    h.sessions.logout();
    let principal = h.resolver.resolve(Some(header.as_str()), later);
    assert!(principal.is_authenticated());
}

#[test]
fn deactivated_subject_loses_access_and_refresh() {
    let h = harness();
    let (id, principal) = h.principal_for("gone@example.com", Some("user"));
    assert!(principal.is_authenticated());
    let pair = h
        .sessions
        .login(&Credentials::new("gone@example.com", "password1"), t0())
        .unwrap();

    h.directory.set_active(id, false).unwrap();

    let header = format!("Bearer {}", pair.access.as_str());
    let principal = h.resolver.resolve(Some(header.as_str()), t0());
    assert_eq!(principal, Principal::Anonymous);
    assert_eq!(
        h.sessions.refresh(pair.refresh.as_str(), t0()),
        Err(AuthError::InvalidCredentials)
    );
}

#[test]
fn listing_is_gated_then_filtered_per_row() {
    let h = harness();
    let (me, user) = h.principal_for("rows@example.com", Some("user"));
    let (_, manager) = h.principal_for("boss@example.com", Some("manager"));
    let orders = vec![
        Order { number: "ORD-001", owner: Some(me) },
        Order { number: "ORD-002", owner: Some(SubjectId::new()) },
        Order { number: "ORD-003", owner: None },
    ];

    assert!(
        h.authz
            .check_collection(&user, &code("orders"), CollectionAction::List)
            .is_allowed()
    );
    let visible = h
        .authz
        .retain_visible(&user, &code("orders"), orders.clone());
    let numbers: Vec<&str> = visible.iter().map(|o| o.number).collect();
    assert_eq!(numbers, vec!["ORD-001"]);

    assert_eq!(h.authz.retain_visible(&manager, &code("orders"), orders).len(), 3);
}

#[test]
fn rule_changes_apply_to_the_next_decision() {
    let h = harness();
    let (_, guest) = h.principal_for("g2@example.com", Some("guest"));
    let order = Order {
        number: "ORD-9",
        owner: None,
    };
    assert!(!h.authz.check(&guest, &code("orders"), Action::Read, &order).is_allowed());

    h.authz
        .rules()
        .upsert_rule(
            &Role::new("guest"),
            &code("orders"),
            PermissionRule {
                read_all: true,
                ..PermissionRule::default()
            },
        )
        .unwrap();
    assert!(h.authz.check(&guest, &code("orders"), Action::Read, &order).is_allowed());

    h.authz.rules().delete_element(&code("orders")).unwrap();
    assert_eq!(
        h.authz
            .check(&guest, &code("orders"), Action::Read, &order)
            .into_result(),
        Err(AuthzError::UnknownElement(code("orders")))
    );
}

#[test]
fn concurrent_decisions_share_one_engine() {
    let h = Arc::new(harness());
    let (me, user) = h.principal_for("par@example.com", Some("user"));

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let h = Arc::clone(&h);
            let user = user.clone();
            std::thread::spawn(move || {
                let order = Order {
                    number: "ORD-P",
                    owner: Some(if i % 2 == 0 { me } else { SubjectId::new() }),
                };
                for _ in 0..100 {
                    let allowed = h
                        .authz
                        .check(&user, &code("orders"), Action::Delete, &order)
                        .is_allowed();
                    assert_eq!(allowed, i % 2 == 0);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
}

use orgtree_core::db::open_db_in_memory;
use orgtree_core::{
    NodeChanges, NodeDraft, NodeKind, NodeRepoError, NodeRepository, SqliteNodeRepository,
};
use rusqlite::Connection;
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn draft(org: Uuid, kind: NodeKind, parent: Option<Uuid>, name: &str) -> NodeDraft {
    NodeDraft {
        node_uuid: if kind == NodeKind::Organization {
            org
        } else {
            Uuid::new_v4()
        },
        organization_uuid: org,
        kind,
        parent_uuid: parent,
        display_name: name.to_string(),
        color: "white".to_string(),
    }
}

fn seed_org(repo: &SqliteNodeRepository<'_>) -> Uuid {
    let org = Uuid::new_v4();
    repo.create_organization(org, "Org").unwrap();
    repo.insert_node(&draft(org, NodeKind::Organization, None, "Org"))
        .unwrap();
    org
}

#[test]
fn insert_and_get_round_trip() {
    let conn = setup();
    let repo = SqliteNodeRepository::try_new(&conn).unwrap();
    let org = seed_org(&repo);

    let dept = repo
        .insert_node(&draft(org, NodeKind::Department, Some(org), "Audit"))
        .unwrap();
    let loaded = repo.get_node(dept.node_uuid).unwrap().unwrap();

    assert_eq!(loaded, dept);
    assert_eq!(loaded.kind, NodeKind::Department);
    assert_eq!(loaded.parent_uuid, Some(org));
    assert_eq!(loaded.organization_uuid, org);
    assert!(loaded.deleted_at.is_none());
    assert!(loaded.created_at > 0);
    assert!(repo.organization_exists(org).unwrap());
    assert!(!repo.organization_exists(Uuid::new_v4()).unwrap());
}

#[test]
fn insert_with_missing_parent_fails_foreign_key() {
    let conn = setup();
    let repo = SqliteNodeRepository::try_new(&conn).unwrap();
    let org = seed_org(&repo);

    let err = repo
        .insert_node(&draft(org, NodeKind::Employee, Some(Uuid::new_v4()), "Ghost"))
        .unwrap_err();
    assert!(matches!(err, NodeRepoError::Db(_)));
}

#[test]
fn find_by_parent_keeps_insertion_order_and_skips_deleted() {
    let conn = setup();
    let repo = SqliteNodeRepository::try_new(&conn).unwrap();
    let org = seed_org(&repo);

    let first = repo
        .insert_node(&draft(org, NodeKind::Location, Some(org), "First"))
        .unwrap();
    let second = repo
        .insert_node(&draft(org, NodeKind::Location, Some(org), "Second"))
        .unwrap();
    let third = repo
        .insert_node(&draft(org, NodeKind::Location, Some(org), "Third"))
        .unwrap();
    repo.delete_node(second.node_uuid).unwrap();

    let children = repo.find_by_parent(org).unwrap();
    let ids: Vec<Uuid> = children.iter().map(|node| node.node_uuid).collect();
    assert_eq!(ids, vec![first.node_uuid, third.node_uuid]);
    assert!(repo.get_node(second.node_uuid).unwrap().is_none());
}

#[test]
fn update_applies_only_given_fields() {
    let conn = setup();
    let repo = SqliteNodeRepository::try_new(&conn).unwrap();
    let org = seed_org(&repo);
    let location = repo
        .insert_node(&draft(org, NodeKind::Location, Some(org), "Pune"))
        .unwrap();
    let dept = repo
        .insert_node(&draft(org, NodeKind::Department, Some(org), "Audit"))
        .unwrap();

    repo.update_node(dept.node_uuid, &NodeChanges::color("#123456"))
        .unwrap();
    let recolored = repo.get_node(dept.node_uuid).unwrap().unwrap();
    assert_eq!(recolored.color, "#123456");
    assert_eq!(recolored.display_name, "Audit");
    assert_eq!(recolored.parent_uuid, Some(org));

    repo.update_node(
        dept.node_uuid,
        &NodeChanges::reparent(location.node_uuid, "#654321"),
    )
    .unwrap();
    let moved = repo.get_node(dept.node_uuid).unwrap().unwrap();
    assert_eq!(moved.parent_uuid, Some(location.node_uuid));
    assert_eq!(moved.color, "#654321");
}

#[test]
fn update_and_delete_missing_node_return_not_found() {
    let conn = setup();
    let repo = SqliteNodeRepository::try_new(&conn).unwrap();
    let missing = Uuid::new_v4();

    let update_err = repo
        .update_node(missing, &NodeChanges::color("#000000"))
        .unwrap_err();
    assert!(matches!(update_err, NodeRepoError::NodeNotFound(id) if id == missing));

    let delete_err = repo.delete_node(missing).unwrap_err();
    assert!(matches!(delete_err, NodeRepoError::NodeNotFound(id) if id == missing));
}

#[test]
fn list_subtree_returns_only_live_descendants_of_root() {
    let conn = setup();
    let repo = SqliteNodeRepository::try_new(&conn).unwrap();
    let org = seed_org(&repo);
    let a = repo
        .insert_node(&draft(org, NodeKind::Location, Some(org), "A"))
        .unwrap();
    let a1 = repo
        .insert_node(&draft(org, NodeKind::Department, Some(a.node_uuid), "A1"))
        .unwrap();
    let a1x = repo
        .insert_node(&draft(org, NodeKind::Employee, Some(a1.node_uuid), "A1x"))
        .unwrap();
    let b = repo
        .insert_node(&draft(org, NodeKind::Location, Some(org), "B"))
        .unwrap();
    repo.delete_node(a1x.node_uuid).unwrap();

    let ids: Vec<Uuid> = repo
        .list_subtree(a.node_uuid)
        .unwrap()
        .iter()
        .map(|node| node.node_uuid)
        .collect();
    assert_eq!(ids, vec![a.node_uuid, a1.node_uuid]);
    assert!(!ids.contains(&b.node_uuid));

    assert_eq!(repo.list_subtree(org).unwrap().len(), 4);
    assert!(repo.list_subtree(Uuid::new_v4()).unwrap().is_empty());
}

#[test]
fn palette_cursor_is_per_organization_and_wraps() {
    let conn = setup();
    let repo = SqliteNodeRepository::try_new(&conn).unwrap();
    let org_a = seed_org(&repo);
    let org_b = seed_org(&repo);

    let sequence: Vec<usize> = (0..4)
        .map(|_| repo.next_palette_index(org_a, 3).unwrap())
        .collect();
    assert_eq!(sequence, vec![0, 1, 2, 0]);
    assert_eq!(repo.next_palette_index(org_b, 3).unwrap(), 0);
    assert_eq!(repo.next_palette_index(org_a, 3).unwrap(), 1);

    let err = repo.next_palette_index(org_a, 0).unwrap_err();
    assert!(matches!(err, NodeRepoError::InvalidData(_)));
}

#[test]
fn atomically_rolls_back_every_write_on_error() {
    let conn = setup();
    let repo = SqliteNodeRepository::try_new(&conn).unwrap();
    let org = seed_org(&repo);
    let dept_draft = draft(org, NodeKind::Department, Some(org), "Audit");
    let dept_uuid = dept_draft.node_uuid;

    let result: Result<(), NodeRepoError> = repo.atomically(|repo| {
        repo.insert_node(&dept_draft)?;
        repo.next_palette_index(org, 5)?;
        Err(NodeRepoError::InvalidData("abort".to_string()))
    });
    assert!(result.is_err());

    assert!(repo.get_node(dept_uuid).unwrap().is_none());
    assert_eq!(repo.next_palette_index(org, 5).unwrap(), 0);
}

#[test]
fn atomically_commits_on_success() {
    let conn = setup();
    let repo = SqliteNodeRepository::try_new(&conn).unwrap();
    let org = seed_org(&repo);

    let created = repo
        .atomically(|repo| repo.insert_node(&draft(org, NodeKind::Location, Some(org), "HQ")))
        .unwrap();

    assert!(repo.get_node(created.node_uuid).unwrap().is_some());
    assert!(conn.is_autocommit());
}

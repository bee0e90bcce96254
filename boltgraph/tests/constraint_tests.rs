//! Constraint enforcement tests
//!
//! UNIQUE, EXISTS and NODE KEY rules as seen through Cypher, including
//! persistence of the definitions across restarts.

#[path = "testutils/mod.rs"]
mod testutils;

use boltgraph::error::codes;
use boltgraph::{Neo4jStatus, PropertyMap, Value};
use testutils::test_fixture::TestFixture;

#[test]
fn test_unique_duplicates_in_one_transaction() {
    let fixture = TestFixture::new().expect("Failed to create test fixture");
    fixture
        .query("CREATE CONSTRAINT user_email FOR (u:User) REQUIRE u.email IS UNIQUE")
        .unwrap();

    let session = fixture.session();
    session.execute("BEGIN", &PropertyMap::new()).unwrap();
    let _ = session.execute("CREATE (:User {email: 'a@x.com'})", &PropertyMap::new());
    let _ = session.execute("CREATE (:User {email: 'a@x.com'})", &PropertyMap::new());
    let err = session
        .execute("COMMIT", &PropertyMap::new())
        .expect_err("duplicate email must not commit");
    assert_eq!(err.status_code(), codes::CONSTRAINT_VALIDATION_FAILED);
    assert_eq!(fixture.count("User"), 0);

    // A single statement creating both is rejected the same way
    let err = fixture
        .query("CREATE (:User {email: 'b@x.com'}), (:User {email: 'b@x.com'})")
        .expect_err("duplicate email must not commit");
    assert!(err.contains("b@x.com"), "{}", err);
    assert_eq!(fixture.count("User"), 0);
}

#[test]
fn test_unique_against_committed_data() {
    let fixture = TestFixture::new().expect("Failed to create test fixture");
    fixture
        .query("CREATE CONSTRAINT user_email FOR (u:User) REQUIRE u.email IS UNIQUE")
        .unwrap();
    fixture.query("CREATE (:User {email: 'a@x.com'})").unwrap();

    assert!(fixture.query("CREATE (:User {email: 'a@x.com'})").is_err());
    assert!(fixture
        .query("MERGE (u:User {email: 'a@x.com'}) ON MATCH SET u.seen = true")
        .is_ok());
    // Nodes without the property are not constrained
    fixture.query("CREATE (:User {name: 'anon'}), (:User {name: 'anon2'})").unwrap();
    assert_eq!(fixture.count("User"), 3);

    // Moving the value off one node frees it for another
    fixture
        .query("MATCH (u:User {email: 'a@x.com'}) SET u.email = 'old@x.com'")
        .unwrap();
    fixture.query("CREATE (:User {email: 'a@x.com'})").unwrap();
    assert_eq!(fixture.count("User"), 4);
}

#[test]
fn test_exists_requires_property_at_commit() {
    let fixture = TestFixture::new().expect("Failed to create test fixture");
    fixture
        .query("CREATE CONSTRAINT person_name FOR (p:Person) REQUIRE p.name IS NOT NULL")
        .unwrap();

    let err = fixture
        .query("CREATE (:Person {age: 30})")
        .expect_err("missing name must be rejected");
    assert!(err.contains("name"), "{}", err);
    assert_eq!(fixture.count("Person"), 0);

    // Setting the property later in the same statement is enough
    fixture
        .query("CREATE (p:Person {age: 30}) SET p.name = 'Ann'")
        .unwrap();
    assert_eq!(fixture.count("Person"), 1);

    assert!(fixture
        .query("MATCH (p:Person) REMOVE p.name")
        .is_err());
    let name = fixture.query("MATCH (p:Person) RETURN p.name AS n").unwrap();
    assert_eq!(name.get(0, "n"), Some(&Value::from("Ann")));
}

#[test]
fn test_node_key_tuples() {
    let fixture = TestFixture::new().expect("Failed to create test fixture");
    fixture
        .query("CREATE CONSTRAINT person_key FOR (p:Person) REQUIRE (p.first, p.last) IS NODE KEY")
        .unwrap();

    fixture
        .query("CREATE (:Person {first: 'Ann', last: 'Lee'})")
        .unwrap();
    fixture
        .query("CREATE (:Person {first: 'Ann', last: 'Kim'})")
        .unwrap();
    assert!(fixture
        .query("CREATE (:Person {first: 'Ann', last: 'Lee'})")
        .is_err());
    // Every key property is mandatory
    assert!(fixture.query("CREATE (:Person {first: 'Bob'})").is_err());
    assert_eq!(fixture.count("Person"), 2);
}

#[test]
fn test_constraint_creation_checks_existing_data() {
    let fixture = TestFixture::new().expect("Failed to create test fixture");
    fixture
        .query("CREATE (:Book {isbn: '1', copy: 1}), (:Book {isbn: '1', copy: 2})")
        .unwrap();

    let err = fixture
        .db()
        .execute(
            "CREATE CONSTRAINT book_isbn FOR (b:Book) REQUIRE b.isbn IS UNIQUE",
            &PropertyMap::new(),
        )
        .expect_err("existing duplicates block the constraint");
    assert_eq!(err.status_code(), codes::CONSTRAINT_CREATION_FAILED);
    assert!(fixture.db().constraints().is_empty());

    fixture
        .query("MATCH (b:Book {copy: 2}) SET b.isbn = '2'")
        .unwrap();
    let created = fixture
        .query("CREATE CONSTRAINT book_isbn FOR (b:Book) REQUIRE b.isbn IS UNIQUE")
        .unwrap();
    assert_eq!(created.stats.constraints_added, 1);
}

#[test]
fn test_constraint_ddl_errors() {
    let fixture = TestFixture::new().expect("Failed to create test fixture");
    let db = fixture.db();
    let run = |q: &str| db.execute(q, &PropertyMap::new());

    run("CREATE CONSTRAINT user_email FOR (u:User) REQUIRE u.email IS UNIQUE").unwrap();

    let same_name = run("CREATE CONSTRAINT user_email FOR (u:User) REQUIRE u.name IS UNIQUE")
        .expect_err("name is taken");
    assert_eq!(same_name.status_code(), codes::CONSTRAINT_ALREADY_EXISTS);

    let same_rule = run("CREATE CONSTRAINT other FOR (u:User) REQUIRE u.email IS UNIQUE")
        .expect_err("rule already exists");
    assert_eq!(same_rule.status_code(), codes::EQUIVALENT_SCHEMA_RULE);

    let quiet = run("CREATE CONSTRAINT other IF NOT EXISTS FOR (u:User) REQUIRE u.email IS UNIQUE")
        .unwrap();
    assert_eq!(quiet.stats.constraints_added, 0);

    let missing = run("DROP CONSTRAINT nope").expect_err("nothing to drop");
    assert_eq!(missing.status_code(), codes::CONSTRAINT_DROP_FAILED);
    assert_eq!(
        run("DROP CONSTRAINT nope IF EXISTS").unwrap().stats.constraints_removed,
        0
    );
    assert_eq!(
        run("DROP CONSTRAINT user_email").unwrap().stats.constraints_removed,
        1
    );
    assert!(db.constraints().is_empty());
}

#[test]
fn test_unsupported_constraint_forms_are_syntax_errors() {
    let fixture = TestFixture::new().expect("Failed to create test fixture");
    let db = fixture.db();
    for ddl in [
        "CREATE CONSTRAINT since FOR ()-[r:KNOWS]-() REQUIRE r.since IS NOT NULL",
        "CREATE CONSTRAINT rel_id FOR ()-[r:KNOWS]-() REQUIRE r.id IS UNIQUE",
        "CREATE CONSTRAINT age_type FOR (p:Person) REQUIRE p.age IS :: INTEGER",
    ] {
        let err = db
            .execute(ddl, &PropertyMap::new())
            .expect_err("only node label constraints are supported");
        assert_eq!(err.status_code(), codes::SYNTAX_ERROR, "{}", ddl);
    }
    assert!(db.constraints().is_empty());
}

#[test]
fn test_schema_change_after_write_in_transaction() {
    let fixture = TestFixture::new().expect("Failed to create test fixture");
    let session = fixture.session();
    session.execute("BEGIN", &PropertyMap::new()).unwrap();
    session.execute("CREATE (:Item)", &PropertyMap::new()).unwrap();
    let err = session
        .execute(
            "CREATE CONSTRAINT item_sku FOR (i:Item) REQUIRE i.sku IS UNIQUE",
            &PropertyMap::new(),
        )
        .expect_err("schema after write is forbidden");
    assert_eq!(err.status_code(), codes::FORBIDDEN_DUE_TO_TRANSACTION_TYPE);
    session.reset();
    assert!(fixture.db().constraints().is_empty());
    assert_eq!(fixture.count("Item"), 0);
}

#[test]
fn test_constraints_survive_reopen() {
    let mut fixture = TestFixture::new().expect("Failed to create test fixture");
    fixture
        .query("CREATE CONSTRAINT user_email FOR (u:User) REQUIRE u.email IS UNIQUE")
        .unwrap();
    fixture
        .query("CREATE CONSTRAINT ON (p:Person) ASSERT p.name IS NOT NULL")
        .unwrap();
    fixture.query("CREATE (:User {email: 'a@x.com'})").unwrap();

    fixture.reopen().unwrap();

    let shown = fixture.query("SHOW CONSTRAINTS").unwrap();
    assert_eq!(shown.rows.len(), 2);
    let names: Vec<&str> = shown
        .rows
        .iter()
        .filter_map(|row| row[1].as_str())
        .collect();
    assert!(names.contains(&"user_email"));
    assert!(names.contains(&"constraint_person_name_exists"));

    assert!(fixture.query("CREATE (:User {email: 'a@x.com'})").is_err());
    assert!(fixture.query("CREATE (:Person)").is_err());
    assert_eq!(fixture.count("User"), 1);
}

use replimon::gtid::{GtidList, MissingDomainMode};

#[test]
fn parses_and_reprints_canonical_form() {
    let list = GtidList::parse("1-2-3,2-3-4");
    assert_eq!(list.to_string_sorted(), "1-2-3,2-3-4");
}

#[test]
fn parse_sorts_out_of_order_domains() {
    let list = GtidList::parse("2-3-4,1-2-3");
    assert_eq!(list.to_string_sorted(), "1-2-3,2-3-4");
}

#[test]
fn unparsable_input_yields_empty_list() {
    let list = GtidList::parse("not-a-gtid-list");
    assert!(list.is_empty());
}

#[test]
fn empty_input_yields_empty_list() {
    assert!(GtidList::parse("").is_empty());
    assert!(GtidList::parse("   ").is_empty());
}

/// §8 S3: A = `1-2-3,2-3-4`, B = `1-2-3`. Ignoring missing domains, A is 0
/// events ahead of B (domain 2 absent on B is not counted). Counting
/// missing domains in A's favor, domain 2's whole sequence (4) is added.
#[test]
fn events_ahead_scenario_s3() {
    let a = GtidList::parse("1-2-3,2-3-4");
    let b = GtidList::parse("1-2-3");

    assert_eq!(GtidList::events_ahead(&a, &b, MissingDomainMode::Ignore), 0);
    assert_eq!(GtidList::events_ahead(&a, &b, MissingDomainMode::LhsAdd), 4);
}

#[test]
fn events_ahead_counts_only_positive_differences() {
    let ahead = GtidList::parse("1-2-10");
    let behind = GtidList::parse("1-2-3");

    assert_eq!(
        GtidList::events_ahead(&ahead, &behind, MissingDomainMode::Ignore),
        7
    );
    // rhs ahead of lhs on the same domain contributes nothing.
    assert_eq!(
        GtidList::events_ahead(&behind, &ahead, MissingDomainMode::Ignore),
        0
    );
}

#[test]
fn can_replicate_from_is_false_when_ahead_on_a_shared_domain() {
    let replica = GtidList::parse("1-2-10");
    let master = GtidList::parse("1-2-3");
    assert!(!replica.can_replicate_from(&master));

    let behind_replica = GtidList::parse("1-2-3");
    let ahead_master = GtidList::parse("1-2-10");
    assert!(behind_replica.can_replicate_from(&ahead_master));
}

#[test]
fn can_replicate_from_ignores_domains_absent_from_the_master() {
    // Replica tracks a domain the master doesn't report at all; since
    // `can_replicate_from` uses Ignore semantics, this alone can't block it.
    let replica = GtidList::parse("1-2-3,9-1-50");
    let master = GtidList::parse("1-2-3");
    assert!(replica.can_replicate_from(&master));
}

#[test]
fn get_finds_triplet_by_domain() {
    let list = GtidList::parse("1-2-3,5-6-7");
    assert_eq!(list.get(5).map(|t| t.sequence), Some(7));
    assert_eq!(list.get(99), None);
}

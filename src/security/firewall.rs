use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Mutex;

use nftables::batch::Batch;
use nftables::expr::{Expression, NamedExpression, Payload, PayloadBase, PayloadRaw};
use nftables::helper::{self, NftablesError};
use nftables::schema::{
    Chain, Element, NfListObject, Nftables, Rule, Set, SetType, SetTypeValue, Table,
};
use nftables::stmt::{Match, Operator, Statement};
use nftables::types::{NfChainType, NfFamily, NfHook};
use thiserror::Error;
use tracing::{debug, info};

use crate::utils::time::current_timestamp;

const TABLE_NAME: &str = "filter";
const INPUT_CHAIN: &str = "input";
const OUTPUT_CHAIN: &str = "output";
const V4_SET: &str = "trp_black_ipv4";
const V6_SET: &str = "trp_black_ipv6";

/// IP header payload offsets, in bytes. The raw payload expression wants
/// bits, so these are multiplied by 8 when the rules are built.
const V4_DST_OFFSET: u32 = 12;
const V4_SRC_OFFSET: u32 = 16;
const V4_ADDR_LEN: u32 = 4;
const V6_DST_OFFSET: u32 = 8;
const V6_SRC_OFFSET: u32 = 24;
const V6_ADDR_LEN: u32 = 16;

#[derive(Debug, Error)]
pub enum FirewallError {
    #[error("nftables commit failed: {0}")]
    Commit(#[from] NftablesError),
}

/// Seam between the rule builder and the `nft` invocation so the
/// reconciliation logic is testable without a kernel.
pub trait NftApply: Send + Sync {
    fn apply(&self, ruleset: Nftables) -> Result<(), FirewallError>;
}

/// Applies rulesets through the system `nft` binary.
pub struct NftCli;

impl NftApply for NftCli {
    fn apply(&self, ruleset: Nftables) -> Result<(), FirewallError> {
        helper::apply_ruleset(&ruleset, None, None)?;
        Ok(())
    }
}

/// What the proxy believes is in the kernel sets. The kernel is the source
/// of truth; this mirror exists to compute deltas and is only updated after
/// a successful commit.
#[derive(Debug, Default)]
struct Mirror {
    v4: HashMap<Ipv4Addr, i64>,
    v6: HashMap<Ipv6Addr, i64>,
}

/// Manager for the deny tables.
///
/// One table per address family, an input and an output chain hooked at
/// filter priority, one ordered set per family, and a drop rule per chain
/// matching the packet's destination (input) or source (output) address
/// against the set.
///
/// Every mutating call batches its element changes and commits once; the
/// mirror and the kernel are only touched under the single internal lock,
/// which also serialises concurrent ban calls.
pub struct Firewall {
    applier: Box<dyn NftApply>,
    mirror: Mutex<Mirror>,
}

impl Firewall {
    pub fn new(applier: Box<dyn NftApply>) -> Self {
        Self {
            applier,
            mirror: Mutex::new(Mirror::default()),
        }
    }

    /// Install tables, chains, sets, and drop rules in one commit.
    pub fn setup(&self) -> Result<(), FirewallError> {
        let mut batch = Batch::new();
        for family in [NfFamily::IP, NfFamily::IP6] {
            batch.add(NfListObject::Table(table(family.clone())));
            batch.add(NfListObject::Chain(chain(family.clone(), INPUT_CHAIN, NfHook::Input)));
            batch.add(NfListObject::Chain(chain(family.clone(), OUTPUT_CHAIN, NfHook::Output)));
            batch.add(NfListObject::Set(addr_set(family)));
        }
        batch.add(NfListObject::Rule(drop_rule(
            NfFamily::IP,
            INPUT_CHAIN,
            V4_DST_OFFSET,
            V4_ADDR_LEN,
            V4_SET,
        )));
        batch.add(NfListObject::Rule(drop_rule(
            NfFamily::IP,
            OUTPUT_CHAIN,
            V4_SRC_OFFSET,
            V4_ADDR_LEN,
            V4_SET,
        )));
        batch.add(NfListObject::Rule(drop_rule(
            NfFamily::IP6,
            INPUT_CHAIN,
            V6_DST_OFFSET,
            V6_ADDR_LEN,
            V6_SET,
        )));
        batch.add(NfListObject::Rule(drop_rule(
            NfFamily::IP6,
            OUTPUT_CHAIN,
            V6_SRC_OFFSET,
            V6_ADDR_LEN,
            V6_SET,
        )));
        self.applier.apply(batch.to_nftables())?;
        info!("packet filter tables installed");
        Ok(())
    }

    /// Remove everything `setup` installed, in reverse order, one commit.
    /// Deleting a chain drops its rules with it.
    pub fn teardown(&self) -> Result<(), FirewallError> {
        let mut batch = Batch::new();
        for family in [NfFamily::IP, NfFamily::IP6] {
            batch.delete(NfListObject::Chain(chain(family.clone(), INPUT_CHAIN, NfHook::Input)));
            batch.delete(NfListObject::Chain(chain(family.clone(), OUTPUT_CHAIN, NfHook::Output)));
            batch.delete(NfListObject::Set(addr_set(family.clone())));
            batch.delete(NfListObject::Table(table(family)));
        }
        self.applier.apply(batch.to_nftables())?;
        let mut mirror = self.mirror.lock().unwrap();
        mirror.v4.clear();
        mirror.v6.clear();
        info!("packet filter tables removed");
        Ok(())
    }

    /// Add addresses to the deny sets. Already-banned addresses are
    /// filtered out; when nothing remains, no kernel commit is issued.
    /// Returns how many addresses were newly banned.
    pub fn ban(&self, ips: &[IpAddr]) -> Result<usize, FirewallError> {
        let mut mirror = self.mirror.lock().unwrap();
        let (v4, v6) = partition(ips);
        let v4: Vec<Ipv4Addr> = v4.into_iter().filter(|ip| !mirror.v4.contains_key(ip)).collect();
        let v6: Vec<Ipv6Addr> = v6.into_iter().filter(|ip| !mirror.v6.contains_key(ip)).collect();
        if v4.is_empty() && v6.is_empty() {
            return Ok(0);
        }

        let mut batch = Batch::new();
        add_elements(&mut batch, NfFamily::IP, V4_SET, v4.iter().map(|ip| ip.to_string()), false);
        add_elements(&mut batch, NfFamily::IP6, V6_SET, v6.iter().map(|ip| ip.to_string()), false);
        self.applier.apply(batch.to_nftables())?;

        let now = current_timestamp();
        let banned = v4.len() + v6.len();
        for ip in v4 {
            mirror.v4.insert(ip, now);
        }
        for ip in v6 {
            mirror.v6.insert(ip, now);
        }
        debug!(banned, "addresses added to deny sets");
        Ok(banned)
    }

    /// Remove addresses from the deny sets. Unknown addresses are filtered
    /// out; when nothing remains, no kernel commit is issued.
    pub fn unban(&self, ips: &[IpAddr]) -> Result<usize, FirewallError> {
        let mut mirror = self.mirror.lock().unwrap();
        let (v4, v6) = partition(ips);
        let v4: Vec<Ipv4Addr> = v4.into_iter().filter(|ip| mirror.v4.contains_key(ip)).collect();
        let v6: Vec<Ipv6Addr> = v6.into_iter().filter(|ip| mirror.v6.contains_key(ip)).collect();
        if v4.is_empty() && v6.is_empty() {
            return Ok(0);
        }

        let mut batch = Batch::new();
        add_elements(&mut batch, NfFamily::IP, V4_SET, v4.iter().map(|ip| ip.to_string()), true);
        add_elements(&mut batch, NfFamily::IP6, V6_SET, v6.iter().map(|ip| ip.to_string()), true);
        self.applier.apply(batch.to_nftables())?;

        let removed = v4.len() + v6.len();
        for ip in v4 {
            mirror.v4.remove(&ip);
        }
        for ip in v6 {
            mirror.v6.remove(&ip);
        }
        debug!(removed, "addresses removed from deny sets");
        Ok(removed)
    }

    /// Reconcile the kernel sets to exactly `ips`: the symmetric difference
    /// against the mirror becomes one add batch plus one delete batch in a
    /// single commit. Never a drop-all/re-add, which would open a window in
    /// which banned peers can reconnect.
    pub fn replace(&self, ips: &[IpAddr]) -> Result<(), FirewallError> {
        let mut mirror = self.mirror.lock().unwrap();
        let (want_v4, want_v6) = partition(ips);

        let add_v4: Vec<Ipv4Addr> = want_v4.iter().copied().filter(|ip| !mirror.v4.contains_key(ip)).collect();
        let del_v4: Vec<Ipv4Addr> = mirror.v4.keys().copied().filter(|ip| !want_v4.contains(ip)).collect();
        let add_v6: Vec<Ipv6Addr> = want_v6.iter().copied().filter(|ip| !mirror.v6.contains_key(ip)).collect();
        let del_v6: Vec<Ipv6Addr> = mirror.v6.keys().copied().filter(|ip| !want_v6.contains(ip)).collect();
        if add_v4.is_empty() && del_v4.is_empty() && add_v6.is_empty() && del_v6.is_empty() {
            return Ok(());
        }

        let mut batch = Batch::new();
        add_elements(&mut batch, NfFamily::IP, V4_SET, add_v4.iter().map(|ip| ip.to_string()), false);
        add_elements(&mut batch, NfFamily::IP6, V6_SET, add_v6.iter().map(|ip| ip.to_string()), false);
        add_elements(&mut batch, NfFamily::IP, V4_SET, del_v4.iter().map(|ip| ip.to_string()), true);
        add_elements(&mut batch, NfFamily::IP6, V6_SET, del_v6.iter().map(|ip| ip.to_string()), true);
        self.applier.apply(batch.to_nftables())?;

        let now = current_timestamp();
        for ip in del_v4 {
            mirror.v4.remove(&ip);
        }
        for ip in del_v6 {
            mirror.v6.remove(&ip);
        }
        for ip in add_v4 {
            mirror.v4.insert(ip, now);
        }
        for ip in add_v6 {
            mirror.v6.insert(ip, now);
        }
        debug!(v4 = mirror.v4.len(), v6 = mirror.v6.len(), "deny sets reconciled");
        Ok(())
    }

    /// Empty both deny sets by deleting exactly the mirrored elements in
    /// one commit.
    pub fn clear_all(&self) -> Result<(), FirewallError> {
        self.replace(&[])
    }

    pub fn is_banned(&self, ip: &IpAddr) -> bool {
        let mirror = self.mirror.lock().unwrap();
        match ip {
            IpAddr::V4(v4) => mirror.v4.contains_key(v4),
            IpAddr::V6(v6) => mirror.v6.contains_key(v6),
        }
    }

    pub fn banned_v4(&self) -> Vec<Ipv4Addr> {
        self.mirror.lock().unwrap().v4.keys().copied().collect()
    }

    pub fn banned_v6(&self) -> Vec<Ipv6Addr> {
        self.mirror.lock().unwrap().v6.keys().copied().collect()
    }

    pub fn banned_count(&self) -> usize {
        let mirror = self.mirror.lock().unwrap();
        mirror.v4.len() + mirror.v6.len()
    }
}

/// Split into families. Malformed input never reaches this point; the
/// orchestration layer parses and silently drops bad strings.
fn partition(ips: &[IpAddr]) -> (Vec<Ipv4Addr>, Vec<Ipv6Addr>) {
    let mut v4 = Vec::with_capacity(ips.len());
    let mut v6 = Vec::new();
    for ip in ips {
        match ip {
            IpAddr::V4(addr) => v4.push(*addr),
            IpAddr::V6(addr) => v6.push(*addr),
        }
    }
    (v4, v6)
}

fn table(family: NfFamily) -> Table {
    Table {
        family,
        name: TABLE_NAME.to_string(),
        handle: None,
    }
}

fn chain(family: NfFamily, name: &str, hook: NfHook) -> Chain {
    Chain {
        family,
        table: TABLE_NAME.to_string(),
        name: name.to_string(),
        newname: None,
        handle: None,
        _type: Some(NfChainType::Filter),
        hook: Some(hook),
        prio: Some(0),
        dev: None,
        policy: None,
    }
}

fn addr_set(family: NfFamily) -> Set {
    let (name, set_type) = match family {
        NfFamily::IP6 => (V6_SET, SetType::Ipv6Addr),
        _ => (V4_SET, SetType::Ipv4Addr),
    };
    Set {
        family,
        table: TABLE_NAME.to_string(),
        name: name.to_string(),
        handle: None,
        set_type: SetTypeValue::Single(set_type),
        policy: None,
        flags: None,
        elem: None,
        timeout: None,
        gc_interval: None,
        size: None,
        comment: None,
    }
}

/// A drop rule matching the address at `offset`/`len` (bytes into the
/// network header) against the named set.
fn drop_rule(family: NfFamily, chain: &str, offset: u32, len: u32, set: &str) -> Rule {
    Rule {
        family,
        table: TABLE_NAME.to_string(),
        chain: chain.to_string(),
        expr: vec![
            Statement::Match(Match {
                left: Expression::Named(NamedExpression::Payload(Payload::PayloadRaw(PayloadRaw {
                    base: PayloadBase::NH,
                    offset: offset * 8,
                    len: len * 8,
                }))),
                right: Expression::String(format!("@{set}")),
                op: Operator::IN,
            }),
            Statement::Drop(None),
        ],
        handle: None,
        index: None,
        comment: None,
    }
}

/// Queue one element batch for the given set. `delete` selects removal.
fn add_elements(
    batch: &mut Batch,
    family: NfFamily,
    set: &str,
    addrs: impl Iterator<Item = String>,
    delete: bool,
) {
    let elem: Vec<Expression> = addrs.map(Expression::String).collect();
    if elem.is_empty() {
        return;
    }
    let element = NfListObject::Element(Element {
        family,
        table: TABLE_NAME.to_string(),
        name: set.to_string(),
        elem,
    });
    if delete {
        batch.delete(element);
    } else {
        batch.add(element);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Records every committed ruleset instead of invoking `nft`.
    #[derive(Default)]
    struct Recorder {
        commits: Arc<AtomicUsize>,
        rulesets: Arc<Mutex<Vec<Nftables>>>,
    }

    impl NftApply for Recorder {
        fn apply(&self, ruleset: Nftables) -> Result<(), FirewallError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            self.rulesets.lock().unwrap().push(ruleset);
            Ok(())
        }
    }

    /// Fails every commit, for mirror-consistency checks. Pointing the
    /// helper at a program that does not exist produces a genuine error.
    struct Failing;

    impl NftApply for Failing {
        fn apply(&self, ruleset: Nftables) -> Result<(), FirewallError> {
            helper::apply_ruleset(&ruleset, Some("/nonexistent/nft"), None)?;
            Ok(())
        }
    }

    fn recording_firewall() -> (Firewall, Arc<AtomicUsize>) {
        let recorder = Recorder::default();
        let commits = recorder.commits.clone();
        (Firewall::new(Box::new(recorder)), commits)
    }

    fn ips(addrs: &[&str]) -> Vec<IpAddr> {
        addrs.iter().map(|a| a.parse().unwrap()).collect()
    }

    #[test]
    fn test_ban_partitions_families() {
        let (firewall, _) = recording_firewall();
        firewall
            .ban(&ips(&["1.1.1.1", "2.2.2.2", "2001:db8::1"]))
            .unwrap();
        let mut v4 = firewall.banned_v4();
        v4.sort();
        assert_eq!(v4, vec!["1.1.1.1".parse::<Ipv4Addr>().unwrap(), "2.2.2.2".parse().unwrap()]);
        assert_eq!(firewall.banned_v6(), vec!["2001:db8::1".parse::<Ipv6Addr>().unwrap()]);
    }

    #[test]
    fn test_ban_is_idempotent_and_short_circuits() {
        let (firewall, commits) = recording_firewall();
        assert_eq!(firewall.ban(&ips(&["1.1.1.1"])).unwrap(), 1);
        assert_eq!(commits.load(Ordering::SeqCst), 1);

        // same input again: same kernel state, no second commit
        assert_eq!(firewall.ban(&ips(&["1.1.1.1"])).unwrap(), 0);
        assert_eq!(commits.load(Ordering::SeqCst), 1);
        assert_eq!(firewall.banned_count(), 1);
    }

    #[test]
    fn test_unban_skips_unknown_addresses() {
        let (firewall, commits) = recording_firewall();
        firewall.ban(&ips(&["1.1.1.1"])).unwrap();
        assert_eq!(firewall.unban(&ips(&["9.9.9.9"])).unwrap(), 0);
        assert_eq!(commits.load(Ordering::SeqCst), 1);

        assert_eq!(firewall.unban(&ips(&["1.1.1.1"])).unwrap(), 1);
        assert_eq!(firewall.banned_count(), 0);
    }

    #[test]
    fn test_replace_reaches_exact_target_state() {
        let (firewall, _) = recording_firewall();
        firewall.ban(&ips(&["1.1.1.1", "2.2.2.2", "2001:db8::1"])).unwrap();

        firewall
            .replace(&ips(&["2.2.2.2", "3.3.3.3", "2001:db8::2"]))
            .unwrap();

        let mut v4 = firewall.banned_v4();
        v4.sort();
        assert_eq!(
            v4,
            vec!["2.2.2.2".parse::<Ipv4Addr>().unwrap(), "3.3.3.3".parse().unwrap()]
        );
        assert_eq!(firewall.banned_v6(), vec!["2001:db8::2".parse::<Ipv6Addr>().unwrap()]);
    }

    #[test]
    fn test_replace_is_one_commit() {
        let (firewall, commits) = recording_firewall();
        firewall.ban(&ips(&["1.1.1.1"])).unwrap();
        commits.store(0, Ordering::SeqCst);

        firewall.replace(&ips(&["2.2.2.2"])).unwrap();
        // one add and one delete, but a single kernel commit
        assert_eq!(commits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_replace_noop_short_circuits() {
        let (firewall, commits) = recording_firewall();
        firewall.ban(&ips(&["1.1.1.1"])).unwrap();
        commits.store(0, Ordering::SeqCst);

        firewall.replace(&ips(&["1.1.1.1"])).unwrap();
        assert_eq!(commits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clear_all_empties_both_sets() {
        let (firewall, _) = recording_firewall();
        firewall.ban(&ips(&["1.1.1.1", "2001:db8::1"])).unwrap();
        firewall.clear_all().unwrap();
        assert_eq!(firewall.banned_count(), 0);
    }

    #[test]
    fn test_failed_commit_leaves_mirror_untouched() {
        let firewall = Firewall::new(Box::new(Failing));
        assert!(firewall.ban(&ips(&["1.1.1.1"])).is_err());
        assert_eq!(firewall.banned_count(), 0);
        assert!(!firewall.is_banned(&"1.1.1.1".parse().unwrap()));
    }

    #[test]
    fn test_setup_builds_tables_chains_sets_rules() {
        let recorder = Recorder::default();
        let rulesets = recorder.rulesets.clone();
        let firewall = Firewall::new(Box::new(recorder));
        firewall.setup().unwrap();

        let committed = rulesets.lock().unwrap();
        assert_eq!(committed.len(), 1);
        // 2 tables + 4 chains + 2 sets + 4 rules
        assert_eq!(committed[0].objects.len(), 12);
    }

    #[test]
    fn test_drop_rule_offsets_are_bits() {
        let rule = drop_rule(NfFamily::IP, INPUT_CHAIN, V4_DST_OFFSET, V4_ADDR_LEN, V4_SET);
        match &rule.expr[0] {
            Statement::Match(m) => match &m.left {
                Expression::Named(NamedExpression::Payload(Payload::PayloadRaw(raw))) => {
                    assert_eq!(raw.offset, 96);
                    assert_eq!(raw.len, 32);
                }
                other => panic!("unexpected match payload: {other:?}"),
            },
            other => panic!("unexpected first statement: {other:?}"),
        }
        assert!(matches!(rule.expr[1], Statement::Drop(None)));
    }
}

//! # Registry Order
//!
//! Randomized registries: delivery order must always follow priority, then
//! role, then the global permission mask, highest first. Every inbound entry
//! is narrowed to read-only so only the global mask can break ties.

#[cfg(test)]
mod tests {
    use crate::fixtures::{local_infra, Tracer, Quiet, Trace};
    use nos_types::{component_id, Permission, Role, Status, Switch, SubscriberConfig};
    use rand::seq::SliceRandom;
    use rand::Rng;
    use std::sync::Arc;

    const NAMES: [&str; 8] = ["s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7"];
    // Security-extended subscribers are redelivered to and would repeat in
    // the trace.
    const ROLES: [Role; 5] = [Role::Base, Role::Network, Role::Management, Role::Security, Role::Admin];

    fn perms() -> [Permission; 4] {
        [
            Permission::NONE,
            Permission::READ,
            Permission::READ | Permission::WRITE,
            Permission::ALL,
        ]
    }

    struct Entry {
        name: &'static str,
        priority: i32,
        role: Role,
        perm: Permission,
    }

    fn run(entries: &[Entry]) -> Vec<&'static str> {
        let engine = local_infra();
        let trace = Trace::default();
        let mut configs = Vec::new();
        for e in entries {
            engine.register_handler(e.name, Arc::new(Tracer::new(e.name, &trace)));
            configs.push(
                SubscriberConfig::new(e.name)
                    .with_status(Status::Enabled)
                    .with_priority(e.priority)
                    .with_role(e.role)
                    .with_perm(e.perm)
                    .inbound_with("SW_CONNECTED", Permission::READ),
            );
        }
        engine.register_handler("switch_mgmt", Arc::new(Quiet));
        configs.push(
            SubscriberConfig::new("switch_mgmt")
                .with_status(Status::Enabled)
                .outbound("SW_CONNECTED"),
        );
        engine.reload(&configs).unwrap();
        engine.start_all();
        engine
            .sw_connected(component_id("switch_mgmt"), Switch::default())
            .unwrap();
        trace.names()
    }

    fn expected(entries: &[Entry]) -> Vec<&'static str> {
        let mut sorted: Vec<&Entry> = entries.iter().collect();
        sorted.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.role.cmp(&a.role))
                .then(b.perm.bits().cmp(&a.perm.bits()))
        });
        sorted.into_iter().map(|e| e.name).collect()
    }

    #[test]
    fn test_random_registries_follow_priority_role_global_perm() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            // Distinct (priority, role, perm) keys so the expected order is total.
            let mut keys: Vec<(i32, Role, Permission)> = Vec::new();
            while keys.len() < NAMES.len() {
                let key = (
                    rng.gen_range(0..3),
                    *ROLES.choose(&mut rng).unwrap(),
                    *perms().choose(&mut rng).unwrap(),
                );
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            let entries: Vec<Entry> = NAMES
                .iter()
                .zip(keys)
                .map(|(&name, (priority, role, perm))| Entry {
                    name,
                    priority,
                    role,
                    perm,
                })
                .collect();
            assert_eq!(run(&entries), expected(&entries));
        }
    }

    #[test]
    fn test_shuffled_declaration_order_is_irrelevant() {
        let mut rng = rand::thread_rng();
        let mut priorities: Vec<i32> = (0..NAMES.len() as i32).collect();
        priorities.shuffle(&mut rng);
        let entries: Vec<Entry> = NAMES
            .iter()
            .zip(priorities)
            .map(|(&name, priority)| Entry {
                name,
                priority,
                role: Role::Network,
                perm: Permission::READ,
            })
            .collect();
        let order = run(&entries);
        assert_eq!(order, expected(&entries));
        assert_eq!(order.len(), NAMES.len());
    }
}

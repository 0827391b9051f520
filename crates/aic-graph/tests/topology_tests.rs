use aic_graph::prelude::*;
use aic_graph::PasswordPolicy;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn topic() -> ResourceSpec {
    ResourceSpec::new("AWS::SNS::Topic", Props::new())
}

proptest! {
    #[test]
    fn prop_order_respects_every_edge(
        node_count in 1..20usize,
        refs in proptest::collection::vec((0..20usize, 0..20usize), 0..40),
        explicit in proptest::collection::vec((0..20usize, 0..20usize), 0..40),
    ) {
        let mut builder = TopologyBuilder::new("prop");
        let mut handles: Vec<ResourceHandle> = Vec::new();
        for i in 0..node_count {
            // reference only resources that already exist
            let mut props = Props::new();
            for (slot, (from, to)) in refs.iter().enumerate() {
                if *to == i && *from < i {
                    props.insert(format!("Ref{slot}"), handles[*from].reference());
                }
            }
            let spec = ResourceSpec::new("AWS::SNS::Topic", props);
            let handle = builder.scope("Prop", "").add(&format!("N{i}"), spec).unwrap();
            handles.push(handle);
        }

        let mut scope = builder.scope("Prop", "");
        for (dependent, dependency) in explicit {
            if dependent < node_count && dependency < node_count {
                // Err means the edge was rejected; the graph must stay acyclic either way
                let _ = scope.depends_on(&handles[dependent], &handles[dependency]);
            }
        }

        let topology = builder.validate().unwrap();
        prop_assert_eq!(topology.order().len(), node_count);
        for id in topology.order() {
            let position = topology.position(id.as_str()).unwrap();
            for dependency in topology.dependencies(id.as_str()) {
                prop_assert!(topology.position(dependency.as_str()).unwrap() < position);
            }
        }
    }

    #[test]
    fn prop_generated_passwords_satisfy_policy(
        seed in any::<u64>(),
        length in 1..64usize,
        exclude_punctuation in any::<bool>(),
    ) {
        let policy = PasswordPolicy { length, exclude_punctuation, include_space: false };
        let mut rng = StdRng::seed_from_u64(seed);
        let password = policy.generate(&mut rng);
        prop_assert!(policy.admits(&password));
        prop_assert!(password.len() >= length);
    }
}

#[test]
fn test_rejects_simple_cycle() {
    let mut builder = TopologyBuilder::new("cycle");
    let mut scope = builder.scope("T", "");
    let a = scope.add("A", topic()).unwrap();
    let b = scope.add("B", topic()).unwrap();
    let c = scope.add("C", topic()).unwrap();

    scope.depends_on(&b, &a).unwrap();
    scope.depends_on(&c, &b).unwrap();

    // Cycle: a -> c
    let err = scope.depends_on(&a, &c).unwrap_err();
    assert!(matches!(err, GraphError::CycleDetected { .. }));
    assert!(builder.validate().is_ok());
}

#[test]
fn test_synth_is_reproducible() {
    let build = || {
        let mut builder = TopologyBuilder::new("repro");
        let mut scope = builder.scope("T", "T");
        let a = scope.add("A", topic()).unwrap();
        scope
            .add(
                "B",
                ResourceSpec::new(
                    "AWS::SNS::Subscription",
                    Props::new()
                        .with("TopicArn", a.reference())
                        .with("Endpoint", Token::join([Token::literal("https://"), a.attr("TopicName")])),
                ),
            )
            .unwrap();
        builder.validate().unwrap()
    };
    assert_eq!(build().synth(), build().synth());
}

#[test]
fn test_lookup_by_logical_id() {
    let mut builder = TopologyBuilder::new("lookup");
    let mut scope = builder.scope("T", "T");
    let a = scope.add("A", topic()).unwrap();
    let b = scope
        .add(
            "B",
            ResourceSpec::new("AWS::SNS::Subscription", Props::new().with("TopicArn", a.reference())),
        )
        .unwrap();
    let topology = builder.validate().unwrap();

    assert_eq!(topology.resource("TB").unwrap().id(), b.id());
    assert_eq!(topology.resource("TB").unwrap().resource_type(), "AWS::SNS::Subscription");
    assert!(topology.resource("TC").is_none());
    assert!(topology.depends_on("TB", "TA"));
    assert!(!topology.depends_on("TA", "TB"));
    assert!(!topology.depends_on("TC", "TA"));
    assert_eq!(topology.dependencies("TB"), vec![a.id()]);
}

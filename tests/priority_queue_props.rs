// tests/priority_queue_props.rs

use proptest::prelude::*;

use schedex::PriorityQueue;

/// Pop everything, returning `(priority, insertion index)` pairs.
fn pop_all(queue: &mut PriorityQueue<usize>) -> Vec<(i64, usize)> {
    let mut out = Vec::new();
    while let Some(element) = queue.pop() {
        out.push((element.priority, element.value));
    }
    out
}

proptest! {
    #[test]
    fn pops_in_priority_then_insertion_order(
        priorities in proptest::collection::vec(-50i64..50, 0..200),
    ) {
        let mut queue = PriorityQueue::new();
        for (index, priority) in priorities.iter().enumerate() {
            queue.push(index, *priority);
        }
        prop_assert_eq!(queue.len(), priorities.len());

        let mut expected: Vec<(i64, usize)> = priorities
            .iter()
            .enumerate()
            .map(|(index, priority)| (*priority, index))
            .collect();
        expected.sort();

        prop_assert_eq!(pop_all(&mut queue), expected);
        prop_assert!(queue.is_empty());
    }

    #[test]
    fn arbitrary_removal_keeps_the_heap_consistent(
        priorities in proptest::collection::vec(any::<i64>(), 1..150),
        removals in proptest::collection::vec(any::<prop::sample::Index>(), 0..150),
    ) {
        let mut queue = PriorityQueue::new();
        let handles: Vec<_> = priorities
            .iter()
            .enumerate()
            .map(|(index, priority)| queue.push(index, *priority))
            .collect();

        let mut removed = vec![false; priorities.len()];
        for pick in removals {
            let index = pick.index(priorities.len());
            let result = queue.remove(handles[index]);
            if removed[index] {
                prop_assert!(result.is_none());
            } else {
                let element = result.expect("first removal succeeds");
                prop_assert_eq!(element.value, index);
                prop_assert_eq!(element.priority, priorities[index]);
                removed[index] = true;
            }
            prop_assert!(!queue.contains(handles[index]));
        }

        let mut expected: Vec<(i64, usize)> = priorities
            .iter()
            .enumerate()
            .filter(|(index, _)| !removed[*index])
            .map(|(index, priority)| (*priority, index))
            .collect();
        expected.sort();

        prop_assert_eq!(queue.peek_priority(), expected.first().map(|(p, _)| *p));
        prop_assert_eq!(pop_all(&mut queue), expected);
    }

    #[test]
    fn handles_from_another_queue_are_rejected(
        priorities in proptest::collection::vec(any::<i64>(), 1..20),
    ) {
        let mut ours = PriorityQueue::new();
        let mut theirs = PriorityQueue::new();
        let foreign: Vec<_> = priorities.iter().map(|p| theirs.push((), *p)).collect();
        for p in &priorities {
            ours.push((), *p);
        }

        for handle in foreign {
            prop_assert!(ours.remove(handle).is_none());
        }
        prop_assert_eq!(ours.len(), priorities.len());
    }
}

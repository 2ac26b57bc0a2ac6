/// Query evaluation against the entity table
use crate::cursor::Position;
use crate::store::EntityStore;
use dstore_core::{
    BatchState, Direction, Entity, Filter, Key, Query, Result, RunQueryResponse, Value,
    KEY_PROPERTY,
};
use std::cmp::Ordering;

/// Run one batch of `query`. `batch_size` caps the entities returned by this
/// call; a capped batch reports `NotFinished`.
pub fn execute(
    store: &EntityStore,
    query: &Query,
    batch_size: Option<usize>,
) -> Result<RunQueryResponse> {
    query.validate()?;
    let orders = query.orders();

    let start = query
        .start_cursor()
        .map(|c| Position::decode(c, orders))
        .transpose()?;
    let end = query
        .end_cursor()
        .map(|c| Position::decode(c, orders))
        .transpose()?;

    let mut matches: Vec<(Position, &Entity)> = store
        .iter()
        .map(|stored| &stored.entity)
        .filter(|entity| in_scope(query, &entity.key))
        .filter(|entity| query.filters().iter().all(|f| matches_filter(entity, f)))
        .filter_map(|entity| position_of(query, entity).map(|pos| (pos, entity)))
        .collect();
    matches.sort_by(|(a, _), (b, _)| a.cmp_under(b, orders));

    let matches = distinct_on(query, matches);

    // Window between the cursors
    let mut window: Vec<(Position, &Entity)> = Vec::new();
    let mut past_end = false;
    for (pos, entity) in matches {
        if let Some(start) = &start {
            if pos.cmp_under(start, orders) != Ordering::Greater {
                continue;
            }
        }
        if let Some(end) = &end {
            if pos.cmp_under(end, orders) == Ordering::Greater {
                past_end = true;
                break;
            }
        }
        window.push((pos, entity));
    }

    let skipped = query.offset_count().min(window.len());
    let remaining_limit = query.limit_count().unwrap_or(usize::MAX);
    let take = match batch_size {
        Some(size) => size.min(remaining_limit),
        None => remaining_limit,
    };
    let entities: Vec<Entity> = window
        .iter()
        .skip(skipped)
        .take(take)
        .map(|(_, entity)| shape(query, entity))
        .collect();

    let consumed = skipped + entities.len();
    let more_results = if consumed >= window.len() {
        if past_end {
            BatchState::MoreResultsAfterCursor
        } else {
            BatchState::NoMoreResults
        }
    } else if entities.len() >= remaining_limit {
        BatchState::MoreResultsAfterLimit
    } else {
        BatchState::NotFinished
    };

    let end_cursor = match consumed.checked_sub(1).and_then(|i| window.get(i)) {
        Some((pos, _)) => Some(pos.encode()?),
        None => query.start_cursor().cloned(),
    };

    Ok(RunQueryResponse {
        entities,
        skipped_results: skipped,
        end_cursor,
        more_results,
    })
}

fn in_scope(query: &Query, key: &Key) -> bool {
    if key.kind() != query.kind() || key.namespace() != query.namespace() {
        return false;
    }
    match query.ancestor() {
        Some(ancestor) => key.has_ancestor(ancestor),
        None => true,
    }
}

/// Indexed value of a property as seen by filters and sort orders
fn indexed_value(entity: &Entity, property: &str) -> Option<Value> {
    if property == KEY_PROPERTY {
        return Some(Value::Key(entity.key.clone()));
    }
    if !entity.is_indexed(property) {
        return None;
    }
    entity.get(property).cloned()
}

fn matches_filter(entity: &Entity, filter: &Filter) -> bool {
    let accepts = |value: &Value| filter.operator.accepts(value.index_cmp(&filter.value));
    match indexed_value(entity, &filter.property) {
        Some(Value::Array(items)) => items.iter().any(accepts),
        Some(value) => accepts(&value),
        None => false,
    }
}

/// Sort position, `None` when an ordered property is missing or unindexed.
/// Arrays sort by their smallest element ascending and largest descending.
fn position_of(query: &Query, entity: &Entity) -> Option<Position> {
    let mut sort_values = Vec::with_capacity(query.orders().len());
    for order in query.orders() {
        let value = match indexed_value(entity, &order.property)? {
            Value::Array(items) => {
                let pick = items.into_iter().reduce(|a, b| {
                    let keep_a = match order.direction {
                        Direction::Ascending => a.index_cmp(&b) != Ordering::Greater,
                        Direction::Descending => a.index_cmp(&b) != Ordering::Less,
                    };
                    if keep_a {
                        a
                    } else {
                        b
                    }
                });
                pick?
            }
            value => value,
        };
        sort_values.push(value);
    }
    Some(Position {
        sort_values,
        key: entity.key.clone(),
    })
}

/// Keep the first entity of each distinct combination of group-by values.
/// Values are grouped under the same equality filters use, so `3` and `3.0`
/// fall into one group.
fn distinct_on<'a>(
    query: &Query,
    matches: Vec<(Position, &'a Entity)>,
) -> Vec<(Position, &'a Entity)> {
    let properties = query.group_by_properties();
    if properties.is_empty() {
        return matches;
    }
    let mut seen: Vec<Vec<Value>> = Vec::new();
    let mut kept = Vec::with_capacity(matches.len());
    for (pos, entity) in matches {
        let group: Vec<Value> = properties
            .iter()
            .map(|p| indexed_value(entity, p).unwrap_or(Value::Null))
            .collect();
        if !seen.iter().any(|other| same_group(other, &group)) {
            seen.push(group);
            kept.push((pos, entity));
        }
    }
    kept
}

fn same_group(a: &[Value], b: &[Value]) -> bool {
    a.iter().zip(b).all(|(x, y)| x.index_cmp(y) == Ordering::Equal)
}

/// Apply projection to a result entity
fn shape(query: &Query, entity: &Entity) -> Entity {
    if query.is_keys_only() {
        Entity::new(entity.key.clone())
    } else if !query.selected_properties().is_empty() {
        entity.project(query.selected_properties())
    } else {
        entity.clone()
    }
}

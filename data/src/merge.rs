use std::collections::HashMap;

use crate::event::Event;
use crate::line::Line;
use crate::styled::{Builder, Style};

#[derive(Default)]
struct Flow {
    hide: bool,
    /// 1 = newly online, -1 = newly offline.
    state: i8,
    /// Set when the flow began with a rename; hides rename round trips.
    origin: Option<String>,
}

/// Merges `addition` into `former` by re-analyzing the combined event
/// list: a user who joins then parts (or parts then rejoins, or renames
/// back to their former nick) within the group has both events hidden.
///
/// The caller drops the line when the merged body comes out empty.
pub fn merge_line(former: &mut Line, addition: Line) {
    let mut events = std::mem::take(&mut former.events);
    events.extend(addition.events);

    let mut flows: Vec<Flow> = vec![];
    let mut by_nick: HashMap<String, usize> = HashMap::new();
    let mut event_flows: Vec<Option<usize>> = vec![None; events.len()];

    for (i, event) in events.iter().enumerate() {
        match event {
            Event::UserNick {
                former: former_nick,
                user,
                ..
            } => {
                let former_cf = former_nick.to_lowercase();
                let user_cf = user.to_lowercase();

                if let Some(flow) = by_nick.remove(&former_cf) {
                    if flows[flow].origin.as_deref() == Some(user_cf.as_str()) {
                        // Renamed back to where the flow started
                        flows[flow].hide = true;
                    } else {
                        by_nick.insert(user_cf, flow);
                    }
                    event_flows[i] = Some(flow);
                } else {
                    let flow = flows.len();
                    flows.push(Flow {
                        origin: Some(former_cf),
                        ..Flow::default()
                    });
                    by_nick.insert(user_cf, flow);
                    event_flows[i] = Some(flow);
                }
            }
            Event::UserJoin { user, .. } => {
                let user_cf = user.to_lowercase();

                match by_nick.get(&user_cf).copied() {
                    Some(flow) => {
                        if flows[flow].state == -1 {
                            flows[flow].hide = true;
                            by_nick.remove(&user_cf);
                        }
                    }
                    None => {
                        let flow = flows.len();
                        flows.push(Flow {
                            state: 1,
                            ..Flow::default()
                        });
                        by_nick.insert(user_cf, flow);
                        event_flows[i] = Some(flow);
                    }
                }
            }
            Event::UserPart { user, .. } | Event::UserQuit { user, .. } => {
                let user_cf = user.to_lowercase();

                match by_nick.get(&user_cf).copied() {
                    Some(flow) => {
                        if flows[flow].state == 1 {
                            flows[flow].hide = true;
                            by_nick.remove(&user_cf);
                        }
                    }
                    None => {
                        let flow = flows.len();
                        flows.push(Flow {
                            state: -1,
                            ..Flow::default()
                        });
                        by_nick.insert(user_cf, flow);
                        event_flows[i] = Some(flow);
                    }
                }
            }
            Event::ModeChange { .. } => {
                let Some(nick) = event.subject() else {
                    continue;
                };
                let user_cf = nick.to_lowercase();

                match by_nick.get(&user_cf).copied() {
                    Some(flow) => event_flows[i] = Some(flow),
                    None => {
                        let flow = flows.len();
                        flows.push(Flow::default());
                        by_nick.insert(user_cf, flow);
                        event_flows[i] = Some(flow);
                    }
                }
            }
            _ => {}
        }
    }

    // Re-render the surviving events, two spaces apart
    let mut body = Builder::new();
    let mut first = true;

    for (i, event) in events.iter().enumerate() {
        let visible = event_flows[i].is_some_and(|flow| !flows[flow].hide);
        if !visible {
            continue;
        }
        let Some(line) = event.render_line() else {
            continue;
        };

        if first {
            first = false;
        } else {
            body.set_style(Style::default());
            body.write_str("  ");
        }
        body.write_styled(&line.body);
    }

    former.set_body(body.build());
    former.events = events;
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;

    fn rendered(event: Event) -> Line {
        event.render_line().expect("renderable event")
    }

    fn join(user: &str) -> Event {
        Event::UserJoin {
            channel: "#chan".into(),
            user: user.into(),
            time: Utc::now(),
        }
    }

    fn part(user: &str) -> Event {
        Event::UserPart {
            channel: "#chan".into(),
            user: user.into(),
            time: Utc::now(),
        }
    }

    fn nick(former: &str, user: &str) -> Event {
        Event::UserNick {
            former: former.into(),
            user: user.into(),
            time: Utc::now(),
        }
    }

    #[test]
    fn join_then_part_vanishes() {
        let mut former = rendered(join("alice"));
        merge_line(&mut former, rendered(part("alice")));

        assert!(former.is_zero());
    }

    #[test]
    fn part_then_rejoin_vanishes() {
        let mut former = rendered(part("alice"));
        merge_line(&mut former, rendered(join("alice")));

        assert!(former.is_zero());
    }

    #[test]
    fn rename_round_trip_vanishes() {
        let mut former = rendered(nick("alice", "alice_away"));
        merge_line(&mut former, rendered(nick("alice_away", "alice")));

        assert!(former.is_zero());
    }

    #[test]
    fn join_part_join_leaves_one_join() {
        let mut former = rendered(join("alice"));
        merge_line(&mut former, rendered(part("alice")));
        merge_line(&mut former, rendered(join("alice")));

        assert_eq!(former.body.as_str(), "+alice");
    }

    #[test]
    fn unrelated_users_accumulate() {
        let mut former = rendered(join("alice"));
        merge_line(&mut former, rendered(part("bob")));

        assert_eq!(former.body.as_str(), "+alice  -bob");
    }

    #[test]
    fn merged_events_are_retained_for_later_merges() {
        let mut former = rendered(join("alice"));
        merge_line(&mut former, rendered(join("bob")));
        assert_eq!(former.body.as_str(), "+alice  +bob");

        merge_line(&mut former, rendered(part("alice")));
        assert_eq!(former.body.as_str(), "+bob");
    }
}

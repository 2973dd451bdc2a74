use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Confirmed,
    Declined,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Confirmed => "confirmed",
            AssignmentStatus::Declined => "declined",
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AssignmentStatus::Pending),
            "confirmed" => Ok(AssignmentStatus::Confirmed),
            "declined" => Ok(AssignmentStatus::Declined),
            other => Err(CoreError::ValidationError(format!("unknown assignment status '{}'", other))),
        }
    }
}

/// What a guide is attached to: every departure of a template, or one departure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AssignmentTarget {
    Template(Uuid),
    Instance(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripAssignment {
    pub id: Uuid,
    pub guide_id: Uuid,
    pub template_id: Option<Uuid>,
    pub tour_instance_id: Option<Uuid>,
    pub status: AssignmentStatus,
    pub response_note: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TripAssignment {
    pub fn new(guide_id: Uuid, target: AssignmentTarget) -> Self {
        let now = Utc::now();
        let (template_id, tour_instance_id) = match target {
            AssignmentTarget::Template(id) => (Some(id), None),
            AssignmentTarget::Instance(id) => (None, Some(id)),
        };
        Self {
            id: Uuid::new_v4(),
            guide_id,
            template_id,
            tour_instance_id,
            status: AssignmentStatus::Pending,
            response_note: None,
            responded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn target(&self) -> Option<AssignmentTarget> {
        match (self.template_id, self.tour_instance_id) {
            (Some(id), None) => Some(AssignmentTarget::Template(id)),
            (None, Some(id)) => Some(AssignmentTarget::Instance(id)),
            _ => None,
        }
    }

    /// The assigned guide accepts or declines. Answers are final.
    pub fn respond(&mut self, guide_id: Uuid, accept: bool, note: Option<String>) -> CoreResult<()> {
        if self.guide_id != guide_id {
            return Err(CoreError::Forbidden("assignment belongs to another guide".into()));
        }
        let next = if accept { AssignmentStatus::Confirmed } else { AssignmentStatus::Declined };
        if self.status != AssignmentStatus::Pending {
            return Err(CoreError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        let now = Utc::now();
        self.status = next;
        self.response_note = note.filter(|n| !n.trim().is_empty());
        self.responded_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

/// Result of matching the current guide list against the one submitted by the form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentPlan {
    /// Assignment ids that stay as they are, confirmation status included.
    pub keep: Vec<Uuid>,
    /// Guide ids that need a new pending assignment.
    pub add: Vec<Uuid>,
    /// Assignment ids to drop.
    pub remove: Vec<Uuid>,
}

impl AssignmentPlan {
    pub fn is_noop(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

pub fn reconcile(existing: &[TripAssignment], desired_guides: &[Uuid]) -> AssignmentPlan {
    let mut seen = HashSet::new();
    let desired: Vec<Uuid> = desired_guides.iter().copied().filter(|g| seen.insert(*g)).collect();

    let mut plan = AssignmentPlan::default();
    let mut covered = HashSet::new();
    for assignment in existing {
        if desired.contains(&assignment.guide_id) && covered.insert(assignment.guide_id) {
            plan.keep.push(assignment.id);
        } else {
            plan.remove.push(assignment.id);
        }
    }
    plan.add = desired.into_iter().filter(|g| !covered.contains(g)).collect();
    plan
}

/// Fresh pending assignments on a new departure for every guide that has not
/// declined the template.
pub fn inherit_for_instance(template_assignments: &[TripAssignment], instance_id: Uuid) -> Vec<TripAssignment> {
    let mut seen = HashSet::new();
    template_assignments
        .iter()
        .filter(|a| a.status != AssignmentStatus::Declined)
        .filter(|a| seen.insert(a.guide_id))
        .map(|a| TripAssignment::new(a.guide_id, AssignmentTarget::Instance(instance_id)))
        .collect()
}

/// The confirmed assignment that lets `guide_id` work a departure, preferring the
/// departure-level one over the template-level one.
pub fn operating_assignment<'a>(
    assignments: &'a [TripAssignment],
    guide_id: Uuid,
    instance_id: Uuid,
    template_id: Uuid,
) -> Option<&'a TripAssignment> {
    let confirmed = |a: &&TripAssignment| a.guide_id == guide_id && a.status == AssignmentStatus::Confirmed;
    assignments
        .iter()
        .filter(confirmed)
        .find(|a| a.tour_instance_id == Some(instance_id))
        .or_else(|| {
            assignments
                .iter()
                .filter(confirmed)
                .find(|a| a.template_id == Some(template_id))
        })
}

pub fn guide_can_operate(
    assignments: &[TripAssignment],
    guide_id: Uuid,
    instance_id: Uuid,
    template_id: Uuid,
) -> bool {
    operating_assignment(assignments, guide_id, instance_id, template_id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assigned(guide: Uuid, target: AssignmentTarget, status: AssignmentStatus) -> TripAssignment {
        let mut a = TripAssignment::new(guide, target);
        a.status = status;
        a
    }

    #[test]
    fn reconcile_keeps_adds_and_removes() {
        let template = AssignmentTarget::Template(Uuid::new_v4());
        let (anna, babis, christos) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let existing = vec![
            assigned(anna, template, AssignmentStatus::Confirmed),
            assigned(babis, template, AssignmentStatus::Pending),
        ];

        let plan = reconcile(&existing, &[anna, christos, christos]);

        assert_eq!(plan.keep, vec![existing[0].id]);
        assert_eq!(plan.remove, vec![existing[1].id]);
        assert_eq!(plan.add, vec![christos]);
        assert!(!plan.is_noop());
    }

    #[test]
    fn reconcile_same_list_is_noop() {
        let target = AssignmentTarget::Instance(Uuid::new_v4());
        let guide = Uuid::new_v4();
        let existing = vec![assigned(guide, target, AssignmentStatus::Declined)];
        let plan = reconcile(&existing, &[guide]);
        assert!(plan.is_noop());
        assert_eq!(plan.keep.len(), 1);
    }

    #[test]
    fn reconcile_drops_duplicate_rows_for_one_guide() {
        let target = AssignmentTarget::Instance(Uuid::new_v4());
        let guide = Uuid::new_v4();
        let existing = vec![
            assigned(guide, target, AssignmentStatus::Confirmed),
            assigned(guide, target, AssignmentStatus::Pending),
        ];
        let plan = reconcile(&existing, &[guide]);
        assert_eq!(plan.keep, vec![existing[0].id]);
        assert_eq!(plan.remove, vec![existing[1].id]);
        assert!(plan.add.is_empty());
    }

    #[test]
    fn reconcile_to_empty_removes_everything() {
        let target = AssignmentTarget::Template(Uuid::new_v4());
        let existing = vec![assigned(Uuid::new_v4(), target, AssignmentStatus::Pending)];
        let plan = reconcile(&existing, &[]);
        assert_eq!(plan.remove.len(), 1);
        assert!(plan.keep.is_empty() && plan.add.is_empty());
    }

    #[test]
    fn new_departure_inherits_non_declined_guides() {
        let template = AssignmentTarget::Template(Uuid::new_v4());
        let (anna, babis) = (Uuid::new_v4(), Uuid::new_v4());
        let template_assignments = vec![
            assigned(anna, template, AssignmentStatus::Confirmed),
            assigned(babis, template, AssignmentStatus::Declined),
        ];
        let instance_id = Uuid::new_v4();

        let inherited = inherit_for_instance(&template_assignments, instance_id);

        assert_eq!(inherited.len(), 1);
        assert_eq!(inherited[0].guide_id, anna);
        assert_eq!(inherited[0].status, AssignmentStatus::Pending);
        assert_eq!(inherited[0].target(), Some(AssignmentTarget::Instance(instance_id)));
    }

    #[test]
    fn respond_rules() {
        let guide = Uuid::new_v4();
        let mut a = TripAssignment::new(guide, AssignmentTarget::Instance(Uuid::new_v4()));

        assert!(matches!(a.respond(Uuid::new_v4(), true, None), Err(CoreError::Forbidden(_))));

        a.respond(guide, true, Some("See you at the port".into())).unwrap();
        assert_eq!(a.status, AssignmentStatus::Confirmed);
        assert!(a.responded_at.is_some());

        assert!(matches!(a.respond(guide, false, None), Err(CoreError::InvalidTransition { .. })));
    }

    #[test]
    fn operating_requires_confirmation_on_instance_or_template() {
        let guide = Uuid::new_v4();
        let (instance_id, template_id) = (Uuid::new_v4(), Uuid::new_v4());

        let pending = vec![assigned(guide, AssignmentTarget::Instance(instance_id), AssignmentStatus::Pending)];
        assert!(!guide_can_operate(&pending, guide, instance_id, template_id));

        let via_template = vec![assigned(guide, AssignmentTarget::Template(template_id), AssignmentStatus::Confirmed)];
        assert!(guide_can_operate(&via_template, guide, instance_id, template_id));
        assert!(!guide_can_operate(&via_template, Uuid::new_v4(), instance_id, template_id));

        let both = vec![
            via_template[0].clone(),
            assigned(guide, AssignmentTarget::Instance(instance_id), AssignmentStatus::Confirmed),
        ];
        let chosen = operating_assignment(&both, guide, instance_id, template_id).unwrap();
        assert_eq!(chosen.tour_instance_id, Some(instance_id));
    }
}

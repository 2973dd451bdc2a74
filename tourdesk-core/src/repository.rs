use async_trait::async_trait;
use chrono::NaiveDate;
use tourdesk_booking::{
    Booking, BookingDraft, BookingError, BookingStatus, Passenger, PassengerInput, Payment,
};
use tourdesk_catalog::{
    CatalogError, EstimateLine, InstanceChanges, InstanceStatus, Provider, ProviderInput,
    ScheduleRequest, Service, ServiceInput, TemplateInput, Tour, TourInput, TourInstance,
    TourTemplate,
};
use tourdesk_shared::{Page, PageRequest};
use uuid::Uuid;

use crate::assignment::{AssignmentTarget, TripAssignment};
use crate::field::{CheckIn, CheckInInput, ManifestEntry, TripNote, TripNoteInput};
use crate::identity::{NewUser, User, UserUpdate};
use crate::staff::{Employee, EmployeeInput};
use crate::views::{
    AssignmentView, BookingDetail, BookingFilter, BookingUpdate, DashboardSummary, InstanceDetail,
    InstanceFilter, InstanceSummary, PaymentFilter, PaymentInput, ProviderDetail, ProviderFilter,
    Settlement, TemplateDetail, TemplateServiceInput, TourDetail, TourFilter, UserFilter,
};
use crate::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Rule(#[from] CoreError),
    #[error("Storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<CatalogError> for RepositoryError {
    fn from(err: CatalogError) -> Self {
        Self::Rule(err.into())
    }
}

impl From<BookingError> for RepositoryError {
    fn from(err: BookingError) -> Self {
        Self::Rule(err.into())
    }
}

impl RepositoryError {
    pub fn not_found(what: &str, id: Uuid) -> Self {
        Self::NotFound(format!("{} {}", what, id))
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Back-office logins
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, input: &NewUser, password_hash: &str) -> RepoResult<User>;

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;

    /// User and password hash for a login attempt.
    async fn find_credentials(&self, email: &str) -> RepoResult<Option<(User, String)>>;

    async fn list_users(&self, filter: &UserFilter, page: &PageRequest) -> RepoResult<Page<User>>;

    async fn list_guides(&self) -> RepoResult<Vec<User>>;

    async fn update_user(
        &self,
        id: Uuid,
        update: &UserUpdate,
        password_hash: Option<String>,
    ) -> RepoResult<User>;

    async fn delete_user(&self, id: Uuid) -> RepoResult<()>;

    async fn record_login(&self, id: Uuid) -> RepoResult<()>;

    async fn count_users(&self) -> RepoResult<i64>;
}

#[async_trait]
pub trait EmployeeRepository: Send + Sync {
    async fn create_employee(&self, input: &EmployeeInput) -> RepoResult<Employee>;

    async fn get_employee(&self, id: Uuid) -> RepoResult<Option<Employee>>;

    async fn list_employees(&self, search: Option<&str>, page: &PageRequest) -> RepoResult<Page<Employee>>;

    async fn update_employee(&self, id: Uuid, input: &EmployeeInput) -> RepoResult<Employee>;

    async fn delete_employee(&self, id: Uuid) -> RepoResult<()>;
}

/// Providers and the services they sell
#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn create_provider(&self, input: &ProviderInput) -> RepoResult<Provider>;

    async fn get_provider(&self, id: Uuid) -> RepoResult<Option<ProviderDetail>>;

    async fn list_providers(&self, filter: &ProviderFilter, page: &PageRequest) -> RepoResult<Page<Provider>>;

    async fn update_provider(&self, id: Uuid, input: &ProviderInput) -> RepoResult<Provider>;

    async fn delete_provider(&self, id: Uuid) -> RepoResult<()>;

    async fn create_service(&self, provider_id: Uuid, input: &ServiceInput) -> RepoResult<Service>;

    async fn list_services(&self, provider_id: Uuid) -> RepoResult<Vec<Service>>;

    async fn update_service(&self, id: Uuid, input: &ServiceInput) -> RepoResult<Service>;

    async fn delete_service(&self, id: Uuid) -> RepoResult<()>;
}

/// Tours, templates, departures and guide assignments
#[async_trait]
pub trait TourRepository: Send + Sync {
    async fn create_tour(&self, input: &TourInput) -> RepoResult<Tour>;

    async fn get_tour(&self, id: Uuid) -> RepoResult<Option<TourDetail>>;

    async fn list_tours(&self, filter: &TourFilter, page: &PageRequest) -> RepoResult<Page<Tour>>;

    async fn update_tour(&self, id: Uuid, input: &TourInput) -> RepoResult<Tour>;

    async fn delete_tour(&self, id: Uuid) -> RepoResult<()>;

    async fn create_template(&self, tour_id: Uuid, input: &TemplateInput) -> RepoResult<TourTemplate>;

    async fn get_template(&self, id: Uuid) -> RepoResult<Option<TemplateDetail>>;

    async fn update_template(&self, id: Uuid, input: &TemplateInput) -> RepoResult<TourTemplate>;

    async fn delete_template(&self, id: Uuid) -> RepoResult<()>;

    async fn set_template_services(
        &self,
        template_id: Uuid,
        lines: &[TemplateServiceInput],
    ) -> RepoResult<Vec<EstimateLine>>;

    /// Replace the guide list of a template or a departure.
    async fn set_guides(&self, target: AssignmentTarget, guide_ids: &[Uuid]) -> RepoResult<Vec<TripAssignment>>;

    /// Create a departure and hand it the template's guides.
    async fn schedule_instance(&self, template_id: Uuid, req: ScheduleRequest) -> RepoResult<InstanceDetail>;

    async fn get_instance(&self, id: Uuid) -> RepoResult<Option<InstanceDetail>>;

    async fn list_instances(&self, filter: &InstanceFilter, page: &PageRequest) -> RepoResult<Page<InstanceSummary>>;

    async fn update_instance(&self, id: Uuid, changes: InstanceChanges) -> RepoResult<TourInstance>;

    /// Complete or cancel a departure together with its bookings.
    /// Returns the departure and how many bookings changed.
    async fn change_instance_status(&self, id: Uuid, next: InstanceStatus) -> RepoResult<(TourInstance, u64)>;

    async fn delete_instance(&self, id: Uuid) -> RepoResult<()>;

    async fn manifest(&self, instance_id: Uuid) -> RepoResult<Vec<ManifestEntry>>;
}

/// Bookings, passengers and payments
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn create_booking(&self, draft: BookingDraft, recorded_by: Uuid) -> RepoResult<BookingDetail>;

    async fn get_booking(&self, id: Uuid) -> RepoResult<Option<BookingDetail>>;

    async fn list_bookings(&self, filter: &BookingFilter, page: &PageRequest) -> RepoResult<Page<Booking>>;

    async fn update_booking(&self, id: Uuid, update: &BookingUpdate) -> RepoResult<Booking>;

    /// Operator-driven status change; returns the booking and its previous status.
    async fn change_status(&self, id: Uuid, next: BookingStatus) -> RepoResult<(Booking, BookingStatus)>;

    async fn delete_booking(&self, id: Uuid) -> RepoResult<()>;

    async fn add_passenger(&self, booking_id: Uuid, input: &PassengerInput) -> RepoResult<Settlement>;

    async fn update_passenger(&self, id: Uuid, input: &PassengerInput) -> RepoResult<Passenger>;

    async fn remove_passenger(&self, id: Uuid) -> RepoResult<Settlement>;

    async fn record_payment(
        &self,
        booking_id: Uuid,
        input: &PaymentInput,
        recorded_by: Uuid,
    ) -> RepoResult<(Payment, Settlement)>;

    async fn refund_payment(&self, id: Uuid) -> RepoResult<(Payment, Settlement)>;

    async fn delete_payment(&self, id: Uuid) -> RepoResult<Settlement>;

    async fn list_payments(&self, filter: &PaymentFilter, page: &PageRequest) -> RepoResult<Page<Payment>>;
}

/// What guides do on the road
#[async_trait]
pub trait FieldRepository: Send + Sync {
    async fn list_guide_assignments(&self, guide_id: Uuid) -> RepoResult<Vec<AssignmentView>>;

    async fn respond_assignment(
        &self,
        id: Uuid,
        guide_id: Uuid,
        accept: bool,
        note: Option<String>,
    ) -> RepoResult<TripAssignment>;

    /// The confirmed assignment letting this guide work the departure, if any.
    async fn operating_assignment(&self, guide_id: Uuid, instance_id: Uuid) -> RepoResult<Option<TripAssignment>>;

    async fn record_check_in(
        &self,
        instance_id: Uuid,
        assignment: &TripAssignment,
        input: &CheckInInput,
    ) -> RepoResult<CheckIn>;

    async fn list_check_ins(&self, instance_id: Uuid) -> RepoResult<Vec<CheckIn>>;

    async fn add_note(
        &self,
        instance_id: Uuid,
        assignment: &TripAssignment,
        input: &TripNoteInput,
    ) -> RepoResult<TripNote>;

    async fn list_notes(&self, instance_id: Uuid) -> RepoResult<Vec<TripNote>>;
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn dashboard(&self, today: NaiveDate, upcoming_days: i64) -> RepoResult<DashboardSummary>;
}

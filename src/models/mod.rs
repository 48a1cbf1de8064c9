pub mod response;
pub mod task;
pub mod user;

pub use response::ApiResponse;
pub use task::{
    normalize_due_date, CreateTaskRequest, Task, TaskPriority, TaskStatus, UpdateTaskRequest,
    UserRef,
};
pub use user::{LoginRequest, SignupRequest, UpdateUserRequest, User, UserRole, UserSummary};

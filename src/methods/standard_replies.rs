use crate::helper_model::ErrorResponse;
use crate::methods::reservation::CreateBookingError;
use crate::methods::transitions::TransitionError;
use serde::Serialize;
use warp::http::StatusCode;
use warp::{Rejection, Reply};

fn titled(
    title: &str,
    message: &str,
    status: StatusCode,
) -> Result<(warp::reply::Response,), Rejection> {
    let msg = ErrorResponse {
        title: String::from(title),
        message: String::from(message),
    };
    Ok::<_, Rejection>((
        warp::reply::with_status(warp::reply::json(&msg), status).into_response(),
    ))
}

pub fn response_with_obj<T: Serialize>(
    obj: T,
    status: StatusCode,
) -> Result<(warp::reply::Response,), Rejection> {
    Ok::<_, Rejection>((
        warp::reply::with_status(warp::reply::json(&obj), status).into_response(),
    ))
}

pub fn bad_request(err_msg: &str) -> Result<(warp::reply::Response,), Rejection> {
    titled("Bad Request", err_msg, StatusCode::BAD_REQUEST)
}

pub fn invalid_identity() -> Result<(warp::reply::Response,), Rejection> {
    titled(
        "Unauthorized",
        "Missing or malformed identity headers.",
        StatusCode::UNAUTHORIZED,
    )
}

pub fn admin_only() -> Result<(warp::reply::Response,), Rejection> {
    titled(
        "Forbidden",
        "This operation requires administrator privileges.",
        StatusCode::FORBIDDEN,
    )
}

pub fn renter_only() -> Result<(warp::reply::Response,), Rejection> {
    titled(
        "Forbidden",
        "Only renters can create bookings.",
        StatusCode::FORBIDDEN,
    )
}

pub fn not_booking_party() -> Result<(warp::reply::Response,), Rejection> {
    titled(
        "Forbidden",
        "You are not a party to this booking.",
        StatusCode::FORBIDDEN,
    )
}

pub fn booking_not_found() -> Result<(warp::reply::Response,), Rejection> {
    titled(
        "Booking Not Found",
        "No booking exists with this reference.",
        StatusCode::NOT_FOUND,
    )
}

pub fn internal_server_error_response(msg: String) -> Result<(warp::reply::Response,), Rejection> {
    eprintln!("internal error: {}", msg);
    titled(
        "Internal Server Error",
        "Please try again later.",
        StatusCode::INTERNAL_SERVER_ERROR,
    )
}

pub fn create_booking_rejection(
    err: CreateBookingError,
) -> Result<(warp::reply::Response,), Rejection> {
    match err {
        CreateBookingError::InvalidDateRange => titled(
            "Invalid Date Range",
            "The start date must fall before the end date.",
            StatusCode::BAD_REQUEST,
        ),
        CreateBookingError::PastStartDate => titled(
            "Invalid Date Range",
            "The start date cannot be in the past.",
            StatusCode::BAD_REQUEST,
        ),
        CreateBookingError::VehicleNotFound => titled(
            "Vehicle Not Found",
            "No vehicle exists with this id.",
            StatusCode::NOT_FOUND,
        ),
        CreateBookingError::VehicleNotApproved => titled(
            "Vehicle Not Bookable",
            "This vehicle is not currently approved for booking.",
            StatusCode::FORBIDDEN,
        ),
        CreateBookingError::DateRangeUnavailable => titled(
            "Dates Unavailable",
            "The vehicle is already booked for part of the requested dates. Please try different dates.",
            StatusCode::CONFLICT,
        ),
        CreateBookingError::ReservationTimeout => titled(
            "Reservation Timeout",
            "The reservation could not be confirmed in time. Please retry.",
            StatusCode::GATEWAY_TIMEOUT,
        ),
        CreateBookingError::Store(e) => {
            internal_server_error_response(format!("booking/new: {}", e))
        }
    }
}

pub fn transition_rejection(err: TransitionError) -> Result<(warp::reply::Response,), Rejection> {
    match err {
        TransitionError::NotFound => booking_not_found(),
        TransitionError::Rejected(rejection) => titled(
            "Transition Rejected",
            &rejection.reason,
            StatusCode::CONFLICT,
        ),
        TransitionError::TransitionTimeout => titled(
            "Transition Timeout",
            "The booking could not be updated in time. Please retry.",
            StatusCode::GATEWAY_TIMEOUT,
        ),
        TransitionError::Store(e) => {
            internal_server_error_response(format!("booking/transition: {}", e))
        }
    }
}
